//! Switch lowering, assembly and execution end to end

use integration_tests::SwitchFixture;
use ts_bytecode::{Opcode, Operands, SwitchKind, decode, switch_kind};

fn switch_opcode(fixture: &SwitchFixture) -> Opcode {
    let pick = fixture.class.method("pick", "(I)I").unwrap();
    decode(&pick.code).unwrap()[1].opcode
}

fn sample_keys(fixture: &SwitchFixture) -> Vec<i32> {
    let mut keys = vec![i32::MIN, i32::MIN + 1, -1, 0, 1, i32::MAX - 1, i32::MAX];
    for &(key, _) in &fixture.arms {
        keys.extend([key.saturating_sub(1), key, key.saturating_add(1)]);
    }
    keys
}

fn assert_matches_model(fixture: &SwitchFixture) {
    for key in sample_keys(fixture) {
        assert_eq!(fixture.pick(key).unwrap(), fixture.expected(key), "key {key}");
    }
}

#[test]
fn test_dense_keys_use_tableswitch() {
    let fixture = SwitchFixture::new(&[(2, 20), (0, 0), (1, 10), (4, 40)], -1).unwrap();
    assert_eq!(switch_opcode(&fixture), Opcode::Tableswitch);
    assert_matches_model(&fixture);
    // the gap at 3 falls through to the default
    assert_eq!(fixture.pick(3).unwrap(), -1);
}

#[test]
fn test_sparse_keys_use_lookupswitch() {
    let fixture = SwitchFixture::new(&[(-100_000, 1), (7, 2), (1_000_000, 3)], 0).unwrap();
    assert_eq!(switch_opcode(&fixture), Opcode::Lookupswitch);
    assert_matches_model(&fixture);
}

#[test]
fn test_extreme_keys() {
    let fixture = SwitchFixture::new(&[(i32::MIN, 1), (i32::MAX, 2)], 0).unwrap();
    assert_eq!(switch_opcode(&fixture), Opcode::Lookupswitch);
    assert_matches_model(&fixture);

    let top_arms = [(i32::MAX - 2, 1), (i32::MAX - 1, 2), (i32::MAX, 3)];
    let top = SwitchFixture::new(&top_arms, 0).unwrap();
    assert_eq!(switch_opcode(&top), Opcode::Tableswitch);
    assert_matches_model(&top);

    let bottom_arms = [(i32::MIN, 1), (i32::MIN + 1, 2), (i32::MIN + 2, 3)];
    let bottom = SwitchFixture::new(&bottom_arms, 0).unwrap();
    assert_eq!(switch_opcode(&bottom), Opcode::Tableswitch);
    assert_matches_model(&bottom);
}

#[test]
fn test_few_cases_prefer_lookupswitch() {
    assert_eq!(switch_kind(&[5]), SwitchKind::Lookup);
    assert_eq!(switch_kind(&[5, 6]), SwitchKind::Lookup);
    assert_eq!(switch_kind(&[5, 6, 7]), SwitchKind::Table);

    let fixture = SwitchFixture::new(&[(5, 500)], -5).unwrap();
    assert_eq!(switch_opcode(&fixture), Opcode::Lookupswitch);
    assert_matches_model(&fixture);
}

#[test]
fn test_no_cases_jump_to_default() {
    let fixture = SwitchFixture::new(&[], 9).unwrap();
    assert_eq!(switch_opcode(&fixture), Opcode::Goto);
    assert_eq!(fixture.pick(0).unwrap(), 9);
    assert_eq!(fixture.pick(i32::MIN).unwrap(), 9);
}

#[test]
fn test_duplicate_keys_are_rejected() {
    assert!(SwitchFixture::new(&[(1, 1), (1, 2)], 0).is_err());
}

#[test]
fn test_decoded_targets_land_on_arms() {
    let fixture = SwitchFixture::new(&[(0, 0), (1, 10), (2, 20)], -1).unwrap();
    let pick = fixture.class.method("pick", "(I)I").unwrap();
    let decoded = decode(&pick.code).unwrap();
    let Operands::Table { default, targets, .. } = &decoded[1].operands else {
        panic!("expected a tableswitch, got {:?}", decoded[1].operands);
    };
    let starts: Vec<u32> = decoded.iter().map(|insn| insn.pc).collect();
    for target in targets.iter().chain([default]) {
        assert!(starts.contains(target), "target {target} is not an instruction start");
    }
    assert_eq!(decoded[1].switch_target(1), Some(targets[1]));
    assert_eq!(decoded[1].switch_target(3), Some(*default));
}
