//! Canvas grid layout.
//!
//! Slots live on a 2D canvas but the chain is linear, so chain order is
//! derived by clustering y coordinates into rows and reading row-major.
//! Normalization snaps everything onto a fixed grid; it is idempotent,
//! so the position echoes it triggers produce no further moves.

/// Horizontal spacing between columns.
pub const X_STEP: f64 = 1000.0;
/// Vertical spacing between rows.
pub const Y_STEP: f64 = 600.0;
/// Grid origin.
pub const BASE_X: f64 = 200.0;
pub const BASE_Y: f64 = 200.0;
/// Slots within this vertical distance of a row's anchor share the row.
pub const Y_THRESHOLD: f64 = 150.0;
/// Moves smaller than one canvas unit are noise.
pub const POS_EPSILON: f64 = 1.0;

/// A slot's label and canvas position, the only layout inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPos {
    pub label: String,
    pub x: f64,
    pub y: f64,
}

impl SlotPos {
    pub fn new(label: impl Into<String>, x: f64, y: f64) -> Self {
        SlotPos {
            label: label.into(),
            x,
            y,
        }
    }
}

fn sort_key(a: &SlotPos, b: &SlotPos) -> std::cmp::Ordering {
    a.y.total_cmp(&b.y)
        .then(a.x.total_cmp(&b.x))
        .then(a.label.cmp(&b.label))
}

/// Group slots into rows by y proximity to the first (anchor) slot of
/// each row, then order each row left to right.
pub fn cluster_rows(slots: &[SlotPos]) -> Vec<Vec<SlotPos>> {
    let mut sorted: Vec<SlotPos> = slots.to_vec();
    sorted.sort_by(sort_key);

    let mut rows: Vec<Vec<SlotPos>> = Vec::new();
    let mut anchor_y = f64::NEG_INFINITY;
    for slot in sorted {
        match rows.last_mut() {
            // Anchored to the first slot of the row, not a running mean.
            Some(row) if (slot.y - anchor_y).abs() <= Y_THRESHOLD => row.push(slot),
            _ => {
                anchor_y = slot.y;
                rows.push(vec![slot]);
            }
        }
    }

    for row in &mut rows {
        row.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.label.cmp(&b.label)));
    }
    rows
}

/// Chain order: rows top to bottom, each row left to right.
pub fn sort_slots(slots: &[SlotPos]) -> Vec<String> {
    cluster_rows(slots)
        .into_iter()
        .flatten()
        .map(|s| s.label)
        .collect()
}

/// Grid coordinates after normalization, labels paired with targets.
/// Only slots that would move at least one canvas unit are returned.
pub fn normalize(slots: &[SlotPos]) -> Vec<(String, (f64, f64))> {
    let mut moves = Vec::new();
    for (row_idx, row) in cluster_rows(slots).into_iter().enumerate() {
        let y = BASE_Y + row_idx as f64 * Y_STEP;
        for (col_idx, slot) in row.into_iter().enumerate() {
            let x = BASE_X + col_idx as f64 * X_STEP;
            if (slot.x - x).abs() >= POS_EPSILON || (slot.y - y).abs() >= POS_EPSILON {
                moves.push((slot.label, (x, y)));
            }
        }
    }
    moves
}

/// Coordinates a new slot should take to land at chain index `index`.
///
/// Existing positions stay put; the returned point sorts before the first
/// slot, after the last, or between the two neighbors, so that inserting
/// there and re-sorting yields the intended order without a re-layout.
pub fn insertion_coords(slots: &[SlotPos], index: usize) -> (f64, f64) {
    let ordered: Vec<SlotPos> = cluster_rows(slots).into_iter().flatten().collect();
    if ordered.is_empty() {
        return (BASE_X, BASE_Y);
    }

    if index == 0 {
        let first = &ordered[0];
        return (first.x - X_STEP, first.y);
    }
    if index >= ordered.len() {
        let last = &ordered[ordered.len() - 1];
        return (last.x + X_STEP, last.y);
    }

    let prev = &ordered[index - 1];
    let next = &ordered[index];
    if (prev.y - next.y).abs() <= Y_THRESHOLD {
        // Same row: split the gap.
        ((prev.x + next.x) / 2.0, prev.y)
    } else {
        // Row boundary: extend the earlier row.
        (prev.x + X_STEP, prev.y)
    }
}

/// Coordinates opening a fresh row beneath the current layout.
pub fn new_row_coords(slots: &[SlotPos]) -> (f64, f64) {
    let rows = cluster_rows(slots).len();
    (BASE_X, BASE_Y + rows as f64 * Y_STEP)
}

/// Reassign positions so the slot at chain index `from` lands at `to`,
/// keeping the set of occupied coordinates unchanged.
///
/// Returns `(label, (x, y))` for every slot, in the new chain order. An
/// out-of-range `from` returns positions unchanged.
pub fn move_coords(slots: &[SlotPos], from: usize, to: usize) -> Vec<(String, (f64, f64))> {
    let mut ordered: Vec<SlotPos> = cluster_rows(slots).into_iter().flatten().collect();

    if from >= ordered.len() {
        return ordered.into_iter().map(|s| (s.label, (s.x, s.y))).collect();
    }
    let to = to.min(ordered.len() - 1);

    // The coordinate template stays fixed; slots shuffle through it.
    let template: Vec<(f64, f64)> = ordered.iter().map(|s| (s.x, s.y)).collect();

    let moved = ordered.remove(from);
    ordered.insert(to, moved);

    ordered
        .into_iter()
        .zip(template)
        .map(|(slot, pos)| (slot.label, pos))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nearby_y_values_share_a_row() {
        let slots = vec![
            SlotPos::new("a", 200.0, 400.0),
            SlotPos::new("b", 1200.0, 405.0),
            SlotPos::new("c", 2200.0, 410.0),
            SlotPos::new("d", 200.0, 900.0),
        ];
        let rows = cluster_rows(&slots);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 3);
        assert_eq!(rows[1][0].label, "d");
    }

    #[test]
    fn order_is_row_major() {
        let slots = vec![
            SlotPos::new("second", 1200.0, 200.0),
            SlotPos::new("third", 200.0, 800.0),
            SlotPos::new("first", 200.0, 200.0),
        ];
        assert_eq!(sort_slots(&slots), vec!["first", "second", "third"]);
    }

    #[test]
    fn ties_break_on_label() {
        let slots = vec![
            SlotPos::new("b", 200.0, 200.0),
            SlotPos::new("a", 200.0, 200.0),
        ];
        assert_eq!(sort_slots(&slots), vec!["a", "b"]);
    }

    #[test]
    fn normalize_snaps_to_grid() {
        let slots = vec![
            SlotPos::new("a", 230.0, 190.0),
            SlotPos::new("b", 1190.0, 210.0),
            SlotPos::new("c", 250.0, 950.0),
        ];
        assert_eq!(
            normalize(&slots),
            vec![
                ("a".to_string(), (BASE_X, BASE_Y)),
                ("b".to_string(), (BASE_X + X_STEP, BASE_Y)),
                ("c".to_string(), (BASE_X, BASE_Y + Y_STEP)),
            ]
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let slots = vec![
            SlotPos::new("a", BASE_X, BASE_Y),
            SlotPos::new("b", BASE_X + X_STEP, BASE_Y),
        ];
        assert!(normalize(&slots).is_empty());
    }

    #[test]
    fn move_preserves_coordinate_template() {
        let slots = vec![
            SlotPos::new("a", BASE_X, BASE_Y),
            SlotPos::new("b", BASE_X + X_STEP, BASE_Y),
            SlotPos::new("c", BASE_X + 2.0 * X_STEP, BASE_Y),
        ];
        assert_eq!(
            move_coords(&slots, 2, 0),
            vec![
                ("c".to_string(), (BASE_X, BASE_Y)),
                ("a".to_string(), (BASE_X + X_STEP, BASE_Y)),
                ("b".to_string(), (BASE_X + 2.0 * X_STEP, BASE_Y)),
            ]
        );
    }

    #[test]
    fn move_out_of_range_is_identity() {
        let slots = vec![SlotPos::new("a", BASE_X, BASE_Y)];
        assert_eq!(
            move_coords(&slots, 5, 0),
            vec![("a".to_string(), (BASE_X, BASE_Y))]
        );
    }

    #[test]
    fn new_row_opens_below_the_layout() {
        assert_eq!(new_row_coords(&[]), (BASE_X, BASE_Y));

        let slots = vec![
            SlotPos::new("a", BASE_X, BASE_Y),
            SlotPos::new("b", BASE_X, BASE_Y + Y_STEP),
        ];
        assert_eq!(new_row_coords(&slots), (BASE_X, BASE_Y + 2.0 * Y_STEP));
    }

    #[test]
    fn insertion_sorts_into_place() {
        assert_eq!(insertion_coords(&[], 0), (BASE_X, BASE_Y));

        let slots = vec![
            SlotPos::new("a", BASE_X, BASE_Y),
            SlotPos::new("b", BASE_X + X_STEP, BASE_Y),
        ];
        // Before the chain, between a and b, after the chain.
        assert_eq!(insertion_coords(&slots, 0), (BASE_X - X_STEP, BASE_Y));
        assert_eq!(
            insertion_coords(&slots, 1),
            (BASE_X + X_STEP / 2.0, BASE_Y)
        );
        assert_eq!(
            insertion_coords(&slots, 2),
            (BASE_X + 2.0 * X_STEP, BASE_Y)
        );

        // Inserting at a row boundary extends the earlier row.
        let rows = vec![
            SlotPos::new("a", BASE_X, BASE_Y),
            SlotPos::new("b", BASE_X, BASE_Y + Y_STEP),
        ];
        assert_eq!(
            insertion_coords(&rows, 1),
            (BASE_X + X_STEP, BASE_Y)
        );
    }
}
