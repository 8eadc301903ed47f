//! End-to-end scenarios driving a whole `Machine` through the CPU step loop,
//! as opposed to the unit tests alongside each module that exercise one
//! piece in isolation.

use apple2_core::devices::bus::Motherboard;
use apple2_core::devices::cpu::{CpuVariant, OpcodePolicy, Status};
use apple2_core::devices::machine::Machine;
use apple2_core::devices::memory::{INTERNAL_ROM_SIZE, MAIN_ROM_SIZE};

fn blank_machine() -> Machine {
    Machine::new(vec![0xEA; MAIN_ROM_SIZE], vec![0xEA; INTERNAL_ROM_SIZE], CpuVariant::Nmos6502)
}

fn run_program(machine: &mut Machine, program: &[u8]) {
    for (i, &byte) in program.iter().enumerate() {
        machine.write(0x0200 + i as u16, byte);
    }
    machine.cpu.state.pc = 0x0200;
}

#[test]
fn bcd_add_scenario() {
    let mut machine = blank_machine();
    run_program(&mut machine, &[0x69, 0x11]); // ADC #$11
    machine.cpu.state.acc = 0x29;
    machine.cpu.state.status.insert(Status::DECIMAL);
    machine.cpu.state.status.remove(Status::CARRY);

    machine.step();

    assert_eq!(machine.cpu.state.acc, 0x40);
    assert!(!machine.cpu.state.status.contains(Status::CARRY));
    assert!(!machine.cpu.state.status.contains(Status::ZERO));
}

#[test]
fn adc_overflow_accounts_for_incoming_carry() {
    // $7F + $00 is not an overflow on its own, but adding the incoming carry
    // bit tips the signed result from +127 to -128, which the 6502 flags as
    // a carry-into-overflow case: both operands non-negative, result negative.
    let mut machine = blank_machine();
    run_program(&mut machine, &[0x69, 0x00]); // ADC #$00
    machine.cpu.state.acc = 0x7F;
    machine.cpu.state.status.insert(Status::CARRY);

    machine.step();

    assert_eq!(machine.cpu.state.acc, 0x80);
    assert!(machine.cpu.state.status.contains(Status::OVERFLOW));
    assert!(machine.cpu.state.status.contains(Status::NEGATIVE));
}

#[test]
fn bcd_subtract_scenario() {
    let mut machine = blank_machine();
    run_program(&mut machine, &[0xE9, 0x01]); // SBC #$01
    machine.cpu.state.acc = 0x00;
    machine.cpu.state.status.insert(Status::DECIMAL);
    machine.cpu.state.status.insert(Status::CARRY);

    machine.step();

    assert_eq!(machine.cpu.state.acc, 0x99);
    assert!(!machine.cpu.state.status.contains(Status::CARRY));
}

#[test]
fn permissive_opcode_policy_advances_as_nop() {
    let mut machine = blank_machine();
    run_program(&mut machine, &[0x02]); // undefined on both variants
    let start_pc = machine.cpu.state.pc;

    let cycles = machine.step();

    assert!(cycles >= 1);
    assert_eq!(machine.cpu.state.pc, start_pc.wrapping_add(1));
    assert!(!machine.cpu.trapped);
}

#[test]
fn strict_opcode_policy_traps_without_panicking() {
    let mut machine = blank_machine();
    machine.set_opcode_policy(OpcodePolicy::Strict);
    run_program(&mut machine, &[0x02]);

    machine.step();
    assert!(machine.cpu.trapped);

    // Stepping a trapped CPU again is a no-op, not a panic.
    let cycles = machine.step();
    assert_eq!(cycles, 0);
}

#[test]
fn brk_pushes_pc_plus_two() {
    let mut machine = blank_machine();
    run_program(&mut machine, &[0x00]); // BRK at $0200, a 1-byte opcode

    machine.step(); // BRK: pushes $0202 then status, jumps to the $FFFE/$FFFF vector
    assert_eq!(machine.cpu.state.pc, 0xEAEA); // ROM is all $EA in this fixture
    assert!(machine.cpu.state.status.contains(Status::IRQ_DISABLE));
    assert!(machine.cpu.state.status.contains(Status::BREAK));

    // Stack, top to bottom: PC high, PC low, status. $0200 + 2 = $0202.
    assert_eq!(machine.read(0x01FF), 0x02);
    assert_eq!(machine.read(0x01FE), 0x02);
}

#[test]
fn disk_step_in_scenario() {
    let mut machine = blank_machine();
    machine.mount_disk_controller(6, Default::default());

    // Realistic stepper sequence: energize phase 0, energize phase 1 (which
    // steps in one half-track since phase 1 is "ahead" of phase 0),
    // de-energize phase 0, then energize phase 2 (steps in one more
    // half-track). This is the same set/clear alternation a real Apple ][
    // boot ROM or DOS seek routine uses; unlike a run of bare "set" writes
    // with no intervening clears, it doesn't leave two opposing phase bits
    // set at once, which would cancel out the next step (see DESIGN.md's
    // note on this scenario).
    for &addr in &[0xC0E1u16, 0xC0E3, 0xC0E0, 0xC0E5] {
        machine.write(addr, 0);
    }

    let drive = &machine.disks[6].as_ref().unwrap().current_drive();
    assert_eq!(drive.half_track_count, 2);
    assert_eq!(drive.current_track, 1);
}
