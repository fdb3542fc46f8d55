//! Line parser for the host feed.

use crate::event::Event;

/// Addressing prefix the host puts on every instance and port path.
pub const GRAPH_PREFIX: &str = "/graph/";

/// Strip the `/graph/` prefix from a path, if present.
pub fn strip_graph_prefix(path: &str) -> &str {
    path.strip_prefix(GRAPH_PREFIX).unwrap_or(path)
}

/// Parse one feed line into an [`Event`]. Never fails: unrecognized verbs
/// and malformed numeric fields come back as [`Event::Unknown`].
pub fn parse(line: &str) -> Event {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, rest)) = tokens.split_first() else {
        return unknown("", line);
    };

    match verb {
        "ping" => Event::Ping,

        "stats" => match rest {
            [cpu, xruns, ..] => match (cpu.parse(), xruns.parse()) {
                (Ok(cpu_load), Ok(xruns)) => Event::Stats { cpu_load, xruns },
                _ => unknown(verb, line),
            },
            _ => unknown(verb, line),
        },

        "sys_stats" => match rest {
            [mem, freq, temp, ..] => match (mem.parse(), freq.parse(), temp.parse()) {
                (Ok(mem_load), Ok(cpu_freq), Ok(cpu_temp)) => Event::SysStats {
                    mem_load,
                    cpu_freq,
                    cpu_temp,
                },
                _ => unknown(verb, line),
            },
            _ => unknown(verb, line),
        },

        // Both arrive with trailing flags we do not care about.
        "loading_start" => Event::LoadingStart,
        "loading_end" => Event::LoadingEnd,

        "add_hw_port" => match rest {
            [path, "audio", is_out, ..] => Event::HardwarePortAdded {
                name: strip_graph_prefix(path).to_string(),
                is_output: *is_out == "1",
            },
            // MIDI and CV hardware ports are not handled.
            _ => unknown(verb, line),
        },

        "add" => match rest {
            [inst, uri, rx, ry, ..] => {
                // The host sometimes omits usable coordinates; fall back to
                // the origin rather than dropping the instance.
                let (x, y) = match (rx.parse(), ry.parse()) {
                    (Ok(x), Ok(y)) => (x, y),
                    _ => (0.0, 0.0),
                };
                Event::PluginAdded {
                    label: strip_graph_prefix(inst).to_string(),
                    uri: uri.to_string(),
                    x,
                    y,
                }
            }
            [inst, uri] => Event::PluginAdded {
                label: strip_graph_prefix(inst).to_string(),
                uri: uri.to_string(),
                x: 0.0,
                y: 0.0,
            },
            _ => unknown(verb, line),
        },

        "remove" => match rest {
            [":all"] => Event::RemoveAll,
            [inst, ..] => Event::PluginRemoved {
                label: strip_graph_prefix(inst).to_string(),
            },
            _ => unknown(verb, line),
        },

        "connect" | "disconnect" => match rest {
            [src, dst, ..] => {
                let src_path = strip_graph_prefix(src).to_string();
                let dst_path = strip_graph_prefix(dst).to_string();
                if verb == "connect" {
                    Event::Connected { src_path, dst_path }
                } else {
                    Event::Disconnected { src_path, dst_path }
                }
            }
            _ => unknown(verb, line),
        },

        "resetConnections" => Event::ResetConnections,

        // truebypass_changed, size, pb_size and transport also stream on
        // this feed; they carry nothing the client tracks and fall through
        // to Unknown below.
        "plugin_pos" => match rest {
            [inst, rx, ry, ..] => match (rx.parse(), ry.parse()) {
                (Ok(x), Ok(y)) => Event::PluginPositionChanged {
                    label: strip_graph_prefix(inst).to_string(),
                    x,
                    y,
                },
                _ => unknown(verb, line),
            },
            _ => unknown(verb, line),
        },

        "param_set" => match rest {
            [inst, symbol, val, ..] => match val.parse::<f64>() {
                Ok(value) => {
                    let label = strip_graph_prefix(inst).to_string();
                    if *symbol == ":bypass" {
                        Event::BypassChanged {
                            label,
                            bypassed: value > 0.5,
                        }
                    } else {
                        Event::ParamChanged {
                            label,
                            symbol: symbol.to_string(),
                            value,
                        }
                    }
                }
                Err(_) => unknown(verb, line),
            },
            _ => unknown(verb, line),
        },

        _ => unknown(verb, line),
    }
}

fn unknown(verb: &str, line: &str) -> Event {
    Event::Unknown {
        msg_type: verb.to_string(),
        raw: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ping() {
        assert_eq!(parse("ping"), Event::Ping);
    }

    #[test]
    fn stats() {
        assert_eq!(
            parse("stats 23.5 2"),
            Event::Stats {
                cpu_load: 23.5,
                xruns: 2
            }
        );
    }

    #[test]
    fn sys_stats() {
        assert_eq!(
            parse("sys_stats 0.41 1500000 52"),
            Event::SysStats {
                mem_load: 0.41,
                cpu_freq: 1_500_000,
                cpu_temp: 52
            }
        );
    }

    #[test]
    fn loading_markers_ignore_trailing_fields() {
        assert_eq!(parse("loading_start 1 1"), Event::LoadingStart);
        assert_eq!(parse("loading_end 0 0"), Event::LoadingEnd);
    }

    #[test]
    fn hardware_port() {
        assert_eq!(
            parse("add_hw_port /graph/capture_1 audio 0"),
            Event::HardwarePortAdded {
                name: "capture_1".into(),
                is_output: false
            }
        );
        assert_eq!(
            parse("add_hw_port /graph/playback_2 audio 1"),
            Event::HardwarePortAdded {
                name: "playback_2".into(),
                is_output: true
            }
        );
    }

    #[test]
    fn midi_hardware_port_is_unknown() {
        assert_eq!(
            parse("add_hw_port /graph/midi_in midi 0"),
            Event::Unknown {
                msg_type: "add_hw_port".into(),
                raw: "add_hw_port /graph/midi_in midi 0".into()
            }
        );
    }

    #[test]
    fn plugin_add_with_coordinates() {
        assert_eq!(
            parse("add /graph/DS1_ab12 http://example.org/ds1 200.0 400.0"),
            Event::PluginAdded {
                label: "DS1_ab12".into(),
                uri: "http://example.org/ds1".into(),
                x: 200.0,
                y: 400.0
            }
        );
    }

    #[test]
    fn plugin_add_without_coordinates() {
        assert_eq!(
            parse("add /graph/DS1_ab12 http://example.org/ds1"),
            Event::PluginAdded {
                label: "DS1_ab12".into(),
                uri: "http://example.org/ds1".into(),
                x: 0.0,
                y: 0.0
            }
        );
    }

    #[test]
    fn plugin_add_with_bad_coordinates_falls_back_to_origin() {
        assert_eq!(
            parse("add /graph/DS1_ab12 http://example.org/ds1 nan?? wat"),
            Event::PluginAdded {
                label: "DS1_ab12".into(),
                uri: "http://example.org/ds1".into(),
                x: 0.0,
                y: 0.0
            }
        );
    }

    #[test]
    fn remove_single_and_all() {
        assert_eq!(
            parse("remove /graph/DS1_ab12"),
            Event::PluginRemoved {
                label: "DS1_ab12".into()
            }
        );
        assert_eq!(parse("remove :all"), Event::RemoveAll);
    }

    #[test]
    fn connect_disconnect() {
        assert_eq!(
            parse("connect /graph/delay_1/out /graph/fuzz_2/in"),
            Event::Connected {
                src_path: "delay_1/out".into(),
                dst_path: "fuzz_2/in".into()
            }
        );
        assert_eq!(
            parse("disconnect /graph/delay_1/out /graph/fuzz_2/in"),
            Event::Disconnected {
                src_path: "delay_1/out".into(),
                dst_path: "fuzz_2/in".into()
            }
        );
    }

    #[test]
    fn param_set() {
        assert_eq!(
            parse("param_set /graph/DS1_ab12 Dist 0.55"),
            Event::ParamChanged {
                label: "DS1_ab12".into(),
                symbol: "Dist".into(),
                value: 0.55
            }
        );
    }

    #[test]
    fn param_set_bypass() {
        assert_eq!(
            parse("param_set /graph/DS1_ab12 :bypass 1"),
            Event::BypassChanged {
                label: "DS1_ab12".into(),
                bypassed: true
            }
        );
        assert_eq!(
            parse("param_set /graph/DS1_ab12 :bypass 0"),
            Event::BypassChanged {
                label: "DS1_ab12".into(),
                bypassed: false
            }
        );
    }

    #[test]
    fn param_set_with_bad_value_is_unknown() {
        assert_eq!(
            parse("param_set /graph/DS1_ab12 Dist loud"),
            Event::Unknown {
                msg_type: "param_set".into(),
                raw: "param_set /graph/DS1_ab12 Dist loud".into()
            }
        );
    }

    #[test]
    fn plugin_pos() {
        assert_eq!(
            parse("plugin_pos /graph/DS1_ab12 1200.0 200.0"),
            Event::PluginPositionChanged {
                label: "DS1_ab12".into(),
                x: 1200.0,
                y: 200.0
            }
        );
    }

    #[test]
    fn reset_connections() {
        assert_eq!(parse("resetConnections"), Event::ResetConnections);
    }

    #[test]
    fn unrecognized_verb() {
        assert_eq!(
            parse("truebypass_changed 1 0"),
            Event::Unknown {
                msg_type: "truebypass_changed".into(),
                raw: "truebypass_changed 1 0".into()
            }
        );
    }

    #[test]
    fn empty_line() {
        assert_eq!(
            parse("   "),
            Event::Unknown {
                msg_type: "".into(),
                raw: "   ".into()
            }
        );
    }

    #[test]
    fn prefix_stripping_tolerates_bare_paths() {
        assert_eq!(strip_graph_prefix("/graph/capture_1"), "capture_1");
        assert_eq!(strip_graph_prefix("capture_1"), "capture_1");
    }
}
