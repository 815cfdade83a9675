//! Lowering of `switch` statements to `tableswitch` or `lookupswitch`
//!
//! The choice uses javac's cost rule: each form is scored as
//! `space + 3 * time`, and the table wins ties.

use crate::assemble::AsmError;
use crate::insn::{Insn, Label};

/// Which switch instruction a set of cases lowers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    /// Dense `tableswitch`
    Table,
    /// Sparse `lookupswitch`
    Lookup,
}

/// Pick the switch form for sorted, distinct keys
///
/// `keys` must be non-empty.
#[must_use]
pub fn switch_kind(keys: &[i32]) -> SwitchKind {
    let (Some(low), Some(high)) = (keys.first(), keys.last()) else {
        return SwitchKind::Lookup;
    };
    let count = keys.len() as i64;
    let table_space = 4 + (i64::from(*high) - i64::from(*low) + 1);
    let table_time = 3;
    let lookup_space = 3 + 2 * count;
    let lookup_time = count;
    if table_space + 3 * table_time <= lookup_space + 3 * lookup_time {
        SwitchKind::Table
    } else {
        SwitchKind::Lookup
    }
}

/// Lower `case key: goto label` arms plus a default into one instruction
///
/// Cases may come in any order. Gaps in a table are filled with the default.
/// With no cases the switch becomes `goto default`.
///
/// # Errors
///
/// Returns `AsmError::DuplicateCase` if a key appears twice
pub fn lower_switch(cases: &[(i32, Label)], default: Label) -> Result<Insn, AsmError> {
    let mut sorted = cases.to_vec();
    sorted.sort_by_key(|(key, _)| *key);
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(AsmError::DuplicateCase(pair[0].0));
    }

    let keys: Vec<i32> = sorted.iter().map(|(key, _)| *key).collect();
    let (Some(&low), Some(&high)) = (keys.first(), keys.last()) else {
        return Ok(Insn::Goto(default));
    };

    let insn = match switch_kind(&keys) {
        SwitchKind::Table => {
            let mut arms = sorted.iter().peekable();
            let targets = (low..=high)
                .map(|key| match arms.peek() {
                    Some((case, label)) if *case == key => {
                        let label = *label;
                        arms.next();
                        label
                    }
                    _ => default,
                })
                .collect();
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            }
        }
        SwitchKind::Lookup => Insn::LookupSwitch {
            default,
            pairs: sorted,
        },
    };
    Ok(insn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_keys_use_table() {
        assert_eq!(switch_kind(&[0, 1, 2]), SwitchKind::Table);
        assert_eq!(switch_kind(&[11, 12, 13, 14, 15]), SwitchKind::Table);
    }

    #[test]
    fn test_sparse_keys_use_lookup() {
        assert_eq!(switch_kind(&[1, 1000]), SwitchKind::Lookup);
        assert_eq!(switch_kind(&[i32::MIN, i32::MAX]), SwitchKind::Lookup);
    }

    #[test]
    fn test_single_key_uses_lookup() {
        // table: 4 + 1 + 9 = 14, lookup: 5 + 3 = 8
        assert_eq!(switch_kind(&[7]), SwitchKind::Lookup);
    }

    #[test]
    fn test_table_fills_gaps_with_default() {
        let default = Label(9);
        let insn = lower_switch(&[(3, Label(3)), (0, Label(0)), (1, Label(1))], default).unwrap();
        assert_eq!(
            insn,
            Insn::TableSwitch {
                low: 0,
                high: 3,
                default,
                targets: vec![Label(0), Label(1), default, Label(3)],
            }
        );
    }

    #[test]
    fn test_lookup_sorts_pairs() {
        let default = Label(0);
        let insn = lower_switch(&[(500, Label(2)), (-500, Label(1))], default).unwrap();
        assert_eq!(
            insn,
            Insn::LookupSwitch {
                default,
                pairs: vec![(-500, Label(1)), (500, Label(2))],
            }
        );
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(lower_switch(&[], Label(4)), Ok(Insn::Goto(Label(4))));
        assert_eq!(
            lower_switch(&[(1, Label(0)), (1, Label(1))], Label(2)),
            Err(AsmError::DuplicateCase(1))
        );
    }
}
