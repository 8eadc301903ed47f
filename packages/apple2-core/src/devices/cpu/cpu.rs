//! Emulator for the MOS 6502 and WDC 65C02, including BCD (decimal mode)
//! arithmetic.

use std::num::Wrapping;

use log::{debug, trace, warn};

use super::super::bus::Motherboard;
use super::{
    structs::{AddressingMode, CpuState, CpuVariant, Instruction, OpcodePolicy, Status, POWERON_CPU_STATE},
    utils,
};
use crate::{adj_cycles, bus, bytes_to_addr, reg};

macro_rules! op_fn {
    ($mnemonic: ident, $mb: ident, $body: expr) => {
        fn $mnemonic<T: WithCpu + Motherboard>($mb: &mut T) {
            $body
        }
    };
}

pub struct Cpu6502 {
    pub state: CpuState,
    /// Which opcode table (NMOS or CMOS) this CPU decodes against.
    pub variant: CpuVariant,
    /// What to do on an opcode byte with no defined behavior.
    pub opcode_policy: OpcodePolicy,
    //region internal state
    /// The number of cycles to wait before executing the next instruction.
    pub cycles: u32,
    /// Whether an interrupt is pending
    pub interrupt_pending: bool,
    /// Whether that interrupt was generated by an NMI (false) or IRQ (true)
    pub maskable_interrupt: bool,
    /// Whether an 'oops' cycle occurred
    pub oops_cycle: bool,
    /// Latched true once a `Strict`-policy invalid opcode halts the CPU.
    pub trapped: bool,
    //endregion
}

impl Cpu6502 {
    /// Create a new CPU in its power-on state. Callers should follow up with
    /// `reset()` once the memory map can serve the reset vector.
    pub fn new(variant: CpuVariant) -> Cpu6502 {
        Cpu6502 {
            state: POWERON_CPU_STATE,
            variant,
            opcode_policy: OpcodePolicy::Permissive,
            cycles: 0,
            interrupt_pending: false,
            maskable_interrupt: false,
            oops_cycle: false,
            trapped: false,
        }
    }
}

/// Trait for a device that owns a CPU, such as the machine or a test harness
pub trait WithCpu {
    fn cpu(&self) -> &Cpu6502;
    fn cpu_mut(&mut self) -> &mut Cpu6502;
}

/// Advance one clock cycle. Returns true when the CPU is ready to execute a
/// new instruction (i.e. any cycles owed by the previous one have drained).
pub fn tick<T: WithCpu>(mb: &mut T) -> bool {
    let cpu = mb.cpu_mut();
    if cpu.cycles > 0 {
        cpu.state.tot_cycles += 1;
        cpu.cycles -= 1;
        return false;
    }
    true
}

/// Execute one instruction, returning the number of cycles it took.
pub fn step<T: WithCpu + Motherboard>(mb: &mut T) -> u32 {
    if mb.cpu().trapped {
        return 0;
    }
    let start = mb.cpu().state.tot_cycles;
    exec(mb);
    while !tick(mb) {}
    mb.cpu().state.tot_cycles.wrapping_sub(start)
}

pub fn exec<T: WithCpu + Motherboard>(mb: &mut T) {
    run_interrupt(mb);
    let instruction = fetch_opcode(mb);
    decode_opcode(mb, instruction);
    if reg!(get instr, mb) == Instruction::Invalid {
        handle_invalid_opcode(mb);
        if mb.cpu().trapped {
            return;
        }
    }
    mb.cpu_mut().state.addr = get_addr(mb, reg!(get instruction, mb));
    exec_instr(mb);
}

pub fn debug<T: WithCpu + Motherboard>(mb: &mut T) -> String {
    let old_pc = reg!(get pc, mb);
    run_interrupt(mb);
    let instruction = fetch_opcode(mb);
    decode_opcode(mb, instruction);
    mb.cpu_mut().state.addr = get_addr(mb, reg!(get instruction, mb));
    let new_pc = reg!(get pc, mb);
    reg!(set pc, mb, old_pc);
    let debug_str = utils::print_debug(mb);
    reg!(set pc, mb, new_pc);
    exec_instr(mb);
    debug_str
}

/// Triggers a hardware reset of the CPU: PC from the reset vector, SP=$FF,
/// D cleared, I set, U always 1.
pub fn reset<T: WithCpu + Motherboard>(mb: &mut T) {
    let fst = bus!(read mb, 0xFFFC);
    let snd = bus!(read mb, 0xFFFD);
    let cpu = mb.cpu_mut();
    cpu.state.stack = 0xFF;
    cpu.state.status &= !Status::DECIMAL;
    cpu.state.status |= Status::IRQ_DISABLE | Status::UNUSED;
    cpu.state.pc = bytes_to_addr!(fst, snd);
    cpu.trapped = false;
}

/// Trigger a non-maskable interrupt
pub fn trigger_nmi<T: WithCpu>(mb: &mut T) {
    let cpu = mb.cpu_mut();
    cpu.interrupt_pending = true;
    cpu.maskable_interrupt = false;
}

/// Trigger a maskable interrupt (IRQ); ignored while I is set
pub fn trigger_irq<T: WithCpu>(mb: &mut T) {
    if mb.cpu().state.status.contains(Status::IRQ_DISABLE) {
        return;
    }
    let cpu = mb.cpu_mut();
    cpu.interrupt_pending = true;
    cpu.maskable_interrupt = true;
}

fn set_flag<T: WithCpu>(mb: &mut T, flag: Status) {
    mb.cpu_mut().state.status |= flag;
}

fn clear_flag<T: WithCpu>(mb: &mut T, flag: Status) {
    mb.cpu_mut().state.status &= !flag;
}

fn adv_pc<T: WithCpu>(mb: &mut T, increment: u16) {
    reg!(add pc, mb, increment);
}

fn handle_invalid_opcode<T: WithCpu + Motherboard>(mb: &mut T) {
    match mb.cpu().opcode_policy {
        OpcodePolicy::Permissive => {
            debug!("invalid opcode ${:02X} at ${:04X}, treating as NOP", reg!(get instruction, mb) as u8, reg!(get pc, mb));
            reg!(set instr, mb, Instruction::NOP);
            reg!(set addr_mode, mb, AddressingMode::Impl);
        }
        OpcodePolicy::Strict => {
            warn!("invalid opcode ${:02X} at ${:04X}, trapping (strict policy)", reg!(get instruction, mb) as u8, reg!(get pc, mb));
            mb.cpu_mut().trapped = true;
        }
    }
}

fn run_interrupt<T: WithCpu + Motherboard>(mb: &mut T) -> bool {
    if !mb.cpu().interrupt_pending {
        return false;
    }
    let is_maskable = mb.cpu().maskable_interrupt;
    trace!("CPU interrupt: {}", if is_maskable { "IRQ" } else { "NMI" });
    mb.cpu_mut().interrupt_pending = false;
    let addr_bytes = reg!(get pc, mb).to_le_bytes();
    push_stack(mb, addr_bytes[1]);
    push_stack(mb, addr_bytes[0]);
    clear_flag(mb, Status::BREAK);
    set_flag(mb, Status::UNUSED);
    let status = reg!(get status, mb).bits();
    push_stack(mb, status);
    set_flag(mb, Status::IRQ_DISABLE);
    let addr = if is_maskable { 0xFFFE } else { 0xFFFA };
    let addr_fst = bus!(read mb, addr);
    let addr_snd = bus!(read mb, addr.wrapping_add(1));
    reg!(set pc, mb, bytes_to_addr!(addr_fst, addr_snd));
    true
}

/// Read the next instruction word from the address bus (opcode + up to 2
/// operand bytes; not every instruction uses all 3).
fn fetch_opcode<T: WithCpu + Motherboard>(mb: &mut T) -> u32 {
    let pc = mb.cpu().state.pc;
    let opcode = bus!(read mb, pc);
    let operand1 = bus!(read mb, pc.wrapping_add(1));
    let operand2 = bus!(read mb, pc.wrapping_add(2));

    u32::from(opcode) | (u32::from(operand1) << 8) | (u32::from(operand2) << 16)
}

fn decode_opcode<T: WithCpu>(mb: &mut T, instruction: u32) {
    let ops = instruction.to_le_bytes();
    let variant = mb.cpu().variant;
    let instr = match variant {
        CpuVariant::Nmos6502 => utils::decode_instruction_nmos(ops[0]),
        CpuVariant::Cmos65C02 => utils::decode_instruction_cmos(ops[0]),
    };
    let cpu = mb.cpu_mut();
    cpu.state.instruction = instruction;
    cpu.state.addr_mode = instr.0;
    cpu.state.instr = instr.1;
}

/// Gets the address of the operand to read from, advancing PC and adjusting
/// the cycle counter for the addressing mode's usual cost.
///
/// The "oops" cycle occurs when an indexed instruction crosses a page
/// boundary, since the CPU reads the high byte first without checking for a
/// carry-out; some instructions special-case this away (see `op_sta`).
fn get_addr<T: WithCpu + Motherboard>(mb: &mut T, instruction: u32) -> u16 {
    let ops = instruction.to_le_bytes();
    adv_pc(mb, 1);
    mb.cpu_mut().oops_cycle = false;

    match mb.cpu().state.addr_mode {
        AddressingMode::Abs => {
            adv_pc(mb, 2);
            bytes_to_addr!(ops[1], ops[2])
        }
        AddressingMode::AbsInd => {
            let addr_fst = bytes_to_addr!(ops[1], ops[2]);
            let is_nmos = mb.cpu().variant == CpuVariant::Nmos6502;
            let addr_snd = if is_nmos {
                // NMOS page-wrap bug: the high byte wraps within the page
                // instead of carrying into the next one.
                bytes_to_addr!(ops[1].wrapping_add(1), ops[2])
            } else {
                addr_fst.wrapping_add(1)
            };
            adv_pc(mb, 2);
            let fst = bus!(read mb, addr_fst);
            let snd = bus!(read mb, addr_snd);
            bytes_to_addr!(fst, snd)
        }
        AddressingMode::AbsX => {
            let addr = bytes_to_addr!(ops[1], ops[2]).wrapping_add(u16::from(reg!(get x, mb)));
            adv_pc(mb, 2);
            if (u16::from(reg!(get x, mb)) + u16::from(ops[1])) & 0x0100 == 0x0100 {
                adj_cycles!(mb, 1);
                mb.cpu_mut().oops_cycle = true;
            }
            addr
        }
        AddressingMode::AbsY => {
            let addr = bytes_to_addr!(ops[1], ops[2]).wrapping_add(u16::from(reg!(get y, mb)));
            adv_pc(mb, 2);
            if (u16::from(reg!(get y, mb)) + u16::from(ops[1])) & 0x0100 == 0x0100 {
                adj_cycles!(mb, 1);
                mb.cpu_mut().oops_cycle = true;
            }
            addr
        }
        AddressingMode::Accum => {
            adj_cycles!(mb, -1i32);
            0x0000
        }
        AddressingMode::Imm => {
            adv_pc(mb, 1);
            adj_cycles!(mb, -1i32);
            0x0000
        }
        AddressingMode::Impl => {
            adj_cycles!(mb, -1i32);
            0x0000
        }
        AddressingMode::IndX => {
            adj_cycles!(mb, -1i32);
            adv_pc(mb, 1);
            let val = ops[1].wrapping_add(reg!(get x, mb));
            let fst = bus!(read mb, u16::from(val));
            let snd = bus!(read mb, u16::from(val.wrapping_add(1)));
            adj_cycles!(mb, 1);
            bytes_to_addr!(fst, snd)
        }
        AddressingMode::IndY => {
            adj_cycles!(mb, -1i32);
            adv_pc(mb, 1);
            let fst = bus!(read mb, u16::from(ops[1]));
            let snd = bus!(read mb, u16::from(ops[1].wrapping_add(1)));
            if (u16::from(reg!(get y, mb)) + u16::from(fst)) & 0x0100 == 0x0100 {
                adj_cycles!(mb, 1);
                mb.cpu_mut().oops_cycle = true;
            }
            bytes_to_addr!(fst, snd).wrapping_add(reg!(get y, mb) as u16)
        }
        AddressingMode::Rel => {
            adv_pc(mb, 1);
            adj_cycles!(mb, -1i32);
            let bytes = reg!(get pc, mb).to_le_bytes();
            let addr = bytes_to_addr!(bytes[0], bytes[1]);
            addr.wrapping_add((ops[1] as i8) as u16)
        }
        AddressingMode::ZP => {
            adv_pc(mb, 1);
            adj_cycles!(mb, -1i32);
            bytes_to_addr!(ops[1], 0u8)
        }
        AddressingMode::ZPX => {
            adv_pc(mb, 1);
            bytes_to_addr!(ops[1].wrapping_add(reg!(get x, mb)), 0u8)
        }
        AddressingMode::ZPY => {
            adv_pc(mb, 1);
            adj_cycles!(mb, -1i32);
            bytes_to_addr!(ops[1].wrapping_add(reg!(get y, mb)), 0u8)
        }
    }
}

fn read<T: WithCpu + Motherboard>(mb: &mut T) -> u8 {
    let ops = reg!(get instruction, mb).to_le_bytes();
    match reg!(get addr_mode, mb) {
        AddressingMode::Imm => ops[1],
        AddressingMode::Accum => reg!(get acc, mb),
        _ => bus!(read mb, reg!(get addr, mb)),
    }
}

fn write<T: WithCpu + Motherboard>(mb: &mut T, data: u8) {
    match reg!(get addr_mode, mb) {
        AddressingMode::Accum => reg!(set acc, mb, data),
        _ => {
            adj_cycles!(mb, 1);
            mb.write(reg!(get addr, mb), data);
        }
    }
}

fn push_stack<T: WithCpu + Motherboard>(mb: &mut T, data: u8) {
    let addr = bytes_to_addr!(reg!(get stack, mb), 0x01u8);
    bus!(write mb, addr, data);
    reg!(sub stack, mb, 1);
}

fn pop_stack<T: WithCpu + Motherboard>(mb: &mut T) -> u8 {
    reg!(add stack, mb, 1);
    let addr = bytes_to_addr!(reg!(get stack, mb), 0x01u8);
    bus!(read mb, addr)
}

fn check_carry<T: WithCpu>(mb: &mut T, val: u16) {
    mb.cpu_mut().state.status.set(Status::CARRY, val & 0x100 == 0x100);
}

fn check_zero<T: WithCpu>(mb: &mut T, val: u8) {
    mb.cpu_mut().state.status.set(Status::ZERO, val == 0);
}

/// V is defined on the 9-bit sum including the incoming carry: a borrowed or
/// carried-in bit can flip whether two same-signed operands overflow into a
/// differently-signed result, so `carry_in` has to be folded into `res`
/// rather than checked separately from it.
fn check_overflow<T: WithCpu>(mb: &mut T, left: u8, right: u8, carry_in: u8) {
    let left = u16::from(left);
    let right = u16::from(right);
    let res = left + right + u16::from(carry_in);
    let overflow = ((left ^ res) & (right ^ res)) & 0x80 != 0;
    mb.cpu_mut().state.status.set(Status::OVERFLOW, overflow);
}

fn check_negative<T: WithCpu>(mb: &mut T, op: u8) {
    mb.cpu_mut().state.status.set(Status::NEGATIVE, op & 0x80 != 0);
}

/// BCD addition per the MOS datasheet's documented half-carry adjustment:
/// low nibble >= $A forces +6 and a nibble carry; high nibble >= $A0 forces
/// +$60 and sets the carry flag. V is computed from the binary sum, same as
/// the non-decimal path, per the datasheet's note on V in decimal mode.
fn adc_decimal<T: WithCpu>(mb: &mut T, acc: u8, op: u8, carry_in: u8) {
    check_overflow(mb, acc, op, carry_in);
    let mut al = (acc & 0x0F) as i16 + (op & 0x0F) as i16 + carry_in as i16;
    if al > 9 {
        al += 6;
    }
    let mut ah = (acc >> 4) as i16 + (op >> 4) as i16 + if al > 0x0F { 1 } else { 0 };
    if ah > 9 {
        ah += 6;
    }
    let carry_out = ah > 0x0F;
    let result = (((ah & 0x0F) << 4) | (al & 0x0F)) as u8;
    mb.cpu_mut().state.status.set(Status::CARRY, carry_out);
    reg!(set acc, mb, result);
    check_zero(mb, result);
    check_negative(mb, result);
}

/// BCD subtraction: mirrors `adc_decimal`, borrowing 6 from each nibble that
/// underflows. C and V come from the ordinary binary subtraction, same as
/// `op_sbc`'s non-decimal path.
fn sbc_decimal<T: WithCpu>(mb: &mut T, acc: u8, op: u8, carry_in: u8) {
    let borrow = 1 - carry_in as i16;
    let binary = acc as i16 - op as i16 - borrow;
    check_overflow(mb, acc, !op, carry_in);
    mb.cpu_mut().state.status.set(Status::CARRY, binary >= 0);

    let mut al = (acc & 0x0F) as i16 - (op & 0x0F) as i16 - borrow;
    let mut ah = (acc >> 4) as i16 - (op >> 4) as i16;
    if al < 0 {
        al -= 6;
        ah -= 1;
    }
    if ah < 0 {
        ah -= 6;
    }
    let result = (((ah & 0x0F) << 4) | (al & 0x0F)) as u8;
    reg!(set acc, mb, result);
    check_zero(mb, result);
    check_negative(mb, result);
}

fn exec_instr<T: WithCpu + Motherboard>(mb: &mut T) {
    let handler = match_handler(reg!(get instr, mb));
    handler(mb);
}

#[allow(type_alias_bounds)]
type OpcodeHandler<T: WithCpu + Motherboard> = fn(mb: &mut T);

fn match_handler<T: WithCpu + Motherboard>(mnemonic: Instruction) -> OpcodeHandler<T> {
    match mnemonic {
        Instruction::ADC => op_adc,
        Instruction::AND => op_and,
        Instruction::ASL => op_asl,
        Instruction::BIT => op_bit,
        Instruction::BPL => op_bpl,
        Instruction::BMI => op_bmi,
        Instruction::BVC => op_bvc,
        Instruction::BVS => op_bvs,
        Instruction::BCC => op_bcc,
        Instruction::BCS => op_bcs,
        Instruction::BNE => op_bne,
        Instruction::BEQ => op_beq,
        Instruction::BRA => op_bra,
        Instruction::BRK => op_brk,
        Instruction::CMP => op_cmp,
        Instruction::CPX => op_cpx,
        Instruction::CPY => op_cpy,
        Instruction::DEC => op_dec,
        Instruction::EOR => op_eor,
        Instruction::CLC => op_clc,
        Instruction::SEC => op_sec,
        Instruction::CLI => op_cli,
        Instruction::SEI => op_sei,
        Instruction::CLV => op_clv,
        Instruction::CLD => op_cld,
        Instruction::SED => op_sed,
        Instruction::INC => op_inc,
        Instruction::JMP => op_jmp,
        Instruction::JSR => op_jsr,
        Instruction::LDA => op_lda,
        Instruction::LDX => op_ldx,
        Instruction::LDY => op_ldy,
        Instruction::LSR => op_lsr,
        Instruction::NOP => op_nop,
        Instruction::ORA => op_ora,
        Instruction::TAX => op_tax,
        Instruction::TXA => op_txa,
        Instruction::DEX => op_dex,
        Instruction::INX => op_inx,
        Instruction::TAY => op_tay,
        Instruction::TYA => op_tya,
        Instruction::DEY => op_dey,
        Instruction::INY => op_iny,
        Instruction::ROL => op_rol,
        Instruction::ROR => op_ror,
        Instruction::RTI => op_rti,
        Instruction::RTS => op_rts,
        Instruction::SBC => op_sbc,
        Instruction::STA => op_sta,
        Instruction::STX => op_stx,
        Instruction::STY => op_sty,
        Instruction::STZ => op_stz,
        Instruction::TXS => op_txs,
        Instruction::TSX => op_tsx,
        Instruction::PHA => op_pha,
        Instruction::PLA => op_pla,
        Instruction::PHP => op_php,
        Instruction::PLP => op_plp,
        Instruction::PHX => op_phx,
        Instruction::PLX => op_plx,
        Instruction::PHY => op_phy,
        Instruction::PLY => op_ply,
        Instruction::TRB => op_trb,
        Instruction::TSB => op_tsb,
        Instruction::Invalid => op_nop,
    }
}

//region Arithmetic ops
op_fn!(op_adc, mb, {
    let op = read(mb);
    let acc = reg!(get acc, mb);
    let carry_in = reg!(get status, mb).contains(Status::CARRY) as u8;
    if reg!(get status, mb).contains(Status::DECIMAL) {
        adc_decimal(mb, acc, op, carry_in);
        if mb.cpu().variant == CpuVariant::Cmos65C02 {
            // The 65C02 spends an extra cycle re-deriving N/Z/V from the
            // BCD-corrected result; the NMOS part does not.
            adj_cycles!(mb, 1);
        }
    } else {
        let val = u16::from(acc) + u16::from(op) + u16::from(carry_in);
        check_carry(mb, val);
        check_overflow(mb, acc, op, carry_in);
        reg!(set acc, mb, (0xFF & val) as u8);
        check_zero(mb, reg!(get acc, mb));
        check_negative(mb, reg!(get acc, mb));
    }
});
op_fn!(op_sbc, mb, {
    let op = read(mb);
    let acc = reg!(get acc, mb);
    let carry_in = reg!(get status, mb).contains(Status::CARRY) as u8;
    if reg!(get status, mb).contains(Status::DECIMAL) {
        sbc_decimal(mb, acc, op, carry_in);
        if mb.cpu().variant == CpuVariant::Cmos65C02 {
            adj_cycles!(mb, 1);
        }
    } else {
        let val = Wrapping(u16::from(acc)) - Wrapping(u16::from(op)) - Wrapping(u16::from(1 - carry_in));
        check_carry(mb, !val.0);
        check_overflow(mb, acc, !op, carry_in);
        reg!(set acc, mb, (0xFF & val.0) as u8);
        check_zero(mb, reg!(get acc, mb));
        check_negative(mb, reg!(get acc, mb));
    }
});
//endregion

//region Bitwise ops
op_fn!(op_and, mb, {
    mb.cpu_mut().state.acc &= read(mb);
    check_zero(mb, reg!(get acc, mb));
    check_negative(mb, reg!(get acc, mb));
});
op_fn!(op_bit, mb, {
    let op = read(mb);
    let res = reg!(get acc, mb) & op;
    check_zero(mb, res);
    // The 65C02's immediate-mode BIT only ever sets Z; N/V come from the
    // operand's high bits, which an immediate operand doesn't semantically
    // carry.
    if reg!(get addr_mode, mb) != AddressingMode::Imm {
        reg!(set status, mb, Status::from_bits_truncate((reg!(get status, mb).bits() & 0x3F) | (0xC0 & op)));
    }
});
op_fn!(op_eor, mb, {
    mb.cpu_mut().state.acc ^= read(mb);
    check_zero(mb, reg!(get acc, mb));
    check_negative(mb, reg!(get acc, mb));
});
op_fn!(op_ora, mb, {
    mb.cpu_mut().state.acc |= read(mb);
    check_zero(mb, reg!(get acc, mb));
    check_negative(mb, reg!(get acc, mb));
});
//endregion

op_fn!(op_asl, mb, {
    let op = read(mb);
    let res = u16::from(op) << 1;
    check_carry(mb, res);
    let res = (0xFF & res) as u8;
    check_zero(mb, res);
    check_negative(mb, res);
    match reg!(get addr_mode, mb) {
        AddressingMode::ZP | AddressingMode::ZPX | AddressingMode::Abs => adj_cycles!(mb, 1),
        AddressingMode::AbsX => adj_cycles!(mb, 2),
        _ => {}
    };
    write(mb, res);
});

//region Branch instructions
op_fn!(op_bpl, mb, {
    if reg!(get status, mb).contains(Status::NEGATIVE) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_bmi, mb, {
    if !reg!(get status, mb).contains(Status::NEGATIVE) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_bvc, mb, {
    if reg!(get status, mb).contains(Status::OVERFLOW) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_bvs, mb, {
    if !reg!(get status, mb).contains(Status::OVERFLOW) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_bcc, mb, {
    if reg!(get status, mb).contains(Status::CARRY) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_bcs, mb, {
    if !reg!(get status, mb).contains(Status::CARRY) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_beq, mb, {
    if !reg!(get status, mb).contains(Status::ZERO) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_bne, mb, {
    if reg!(get status, mb).contains(Status::ZERO) {
        return;
    }
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_bra, mb, {
    adj_cycles!(mb, 1);
    reg!(set pc, mb, reg!(get addr, mb));
});
//endregion

op_fn!(op_brk, mb, {
    // BRK is a 1-byte opcode, but the CPU still advances past a padding
    // signature byte before pushing PC; get_addr already advanced PC once
    // for the opcode byte itself, so one more brings it to PC+2.
    adv_pc(mb, 1);
    let addr_bytes = reg!(get pc, mb).to_le_bytes();
    push_stack(mb, addr_bytes[1]);
    push_stack(mb, addr_bytes[0]);
    set_flag(mb, Status::BREAK);
    set_flag(mb, Status::UNUSED);
    let status = reg!(get status, mb).bits();
    push_stack(mb, status);
    set_flag(mb, Status::IRQ_DISABLE);
    let addr_fst = bus!(read mb, 0xFFFE);
    let addr_snd = bus!(read mb, 0xFFFF);
    reg!(set pc, mb, bytes_to_addr!(addr_fst, addr_snd));
});

//region Compare functions
op_fn!(op_cmp, mb, {
    let data = read(mb);
    let res = Wrapping(reg!(get acc, mb)) - Wrapping(data);
    let acc = reg!(get acc, mb);
    mb.cpu_mut().state.status.set(Status::CARRY, acc >= data);
    check_zero(mb, res.0);
    check_negative(mb, res.0);
});
op_fn!(op_cpx, mb, {
    let data = read(mb);
    let res = Wrapping(reg!(get x, mb)) - Wrapping(data);
    let x = reg!(get x, mb);
    mb.cpu_mut().state.status.set(Status::CARRY, x >= data);
    check_zero(mb, res.0);
    check_negative(mb, res.0);
});
op_fn!(op_cpy, mb, {
    let data = read(mb);
    let res = Wrapping(reg!(get y, mb)) - Wrapping(data);
    let y = reg!(get y, mb);
    mb.cpu_mut().state.status.set(Status::CARRY, y >= data);
    check_zero(mb, res.0);
    check_negative(mb, res.0);
});
// endregion

//region Memory functions
op_fn!(op_dec, mb, {
    let op = (Wrapping(read(mb)) - Wrapping(1)).0;
    if reg!(get addr_mode, mb) != AddressingMode::Accum {
        adj_cycles!(mb, 1);
    }
    write(mb, op);
    check_zero(mb, op);
    check_negative(mb, op);
    if reg!(get addr_mode, mb) == AddressingMode::AbsX {
        adj_cycles!(mb, 1);
    }
});
op_fn!(op_inc, mb, {
    let op = (Wrapping(read(mb)) + Wrapping(1)).0;
    if reg!(get addr_mode, mb) != AddressingMode::Accum {
        adj_cycles!(mb, 1);
    }
    write(mb, op);
    check_zero(mb, op);
    check_negative(mb, op);
    if reg!(get addr_mode, mb) == AddressingMode::AbsX {
        adj_cycles!(mb, 1);
    }
});
op_fn!(op_lsr, mb, {
    let data = u16::from(read(mb)) << 7;
    mb.cpu_mut().state.status.set(Status::CARRY, data & 0x00_80 == 0x00_80);
    let data = data.to_be_bytes()[0];
    check_zero(mb, data);
    check_negative(mb, data);
    match reg!(get addr_mode, mb) {
        AddressingMode::Abs => adj_cycles!(mb, 1),
        AddressingMode::AbsX => adj_cycles!(mb, 2),
        AddressingMode::ZP => adj_cycles!(mb, 1),
        AddressingMode::ZPX => adj_cycles!(mb, 1),
        _ => {}
    };
    write(mb, data);
});
op_fn!(op_ror, mb, {
    let data = u16::from(read(mb)) << 7
        | if reg!(get status, mb).contains(Status::CARRY) {
            0x80_00
        } else {
            0x0
        };
    mb.cpu_mut().state.status.set(Status::CARRY, data & 0x00_80 == 0x00_80);
    let data = data.to_be_bytes()[0];
    check_zero(mb, data);
    check_negative(mb, data);
    match reg!(get addr_mode, mb) {
        AddressingMode::Abs => adj_cycles!(mb, 1),
        AddressingMode::AbsX => adj_cycles!(mb, 2),
        AddressingMode::ZP => adj_cycles!(mb, 1),
        AddressingMode::ZPX => adj_cycles!(mb, 1),
        _ => {}
    };
    write(mb, data);
});
op_fn!(op_rol, mb, {
    let data = (u16::from(read(mb)) << 1)
        | if reg!(get status, mb).contains(Status::CARRY) {
            0x01
        } else {
            0x00
        };
    mb.cpu_mut().state.status.set(Status::CARRY, data & 0x01_00 == 0x01_00);
    let data: u8 = (data & 0xFF) as u8;
    check_zero(mb, data);
    check_negative(mb, data);
    match reg!(get addr_mode, mb) {
        AddressingMode::Abs => adj_cycles!(mb, 1),
        AddressingMode::AbsX => adj_cycles!(mb, 2),
        AddressingMode::ZP => adj_cycles!(mb, 1),
        AddressingMode::ZPX => adj_cycles!(mb, 1),
        _ => {}
    };
    write(mb, data);
});
//endregion

//region Flag operations
op_fn!(op_clc, mb, clear_flag(mb, Status::CARRY));
op_fn!(op_sec, mb, set_flag(mb, Status::CARRY));
op_fn!(op_cli, mb, clear_flag(mb, Status::IRQ_DISABLE));
op_fn!(op_sei, mb, set_flag(mb, Status::IRQ_DISABLE));
op_fn!(op_clv, mb, clear_flag(mb, Status::OVERFLOW));
op_fn!(op_cld, mb, clear_flag(mb, Status::DECIMAL));
op_fn!(op_sed, mb, set_flag(mb, Status::DECIMAL));
//endregion

//region Jumps
op_fn!(op_jmp, mb, {
    let addr_mode = reg!(get addr_mode, mb);
    if addr_mode != AddressingMode::Abs && addr_mode != AddressingMode::AbsInd {
        adj_cycles!(mb, 1);
    }
    reg!(set pc, mb, reg!(get addr, mb));
});
op_fn!(op_jsr, mb, {
    if reg!(get addr_mode, mb) != AddressingMode::Abs {
        adj_cycles!(mb, 1);
    }
    let addr_bytes = (reg!(get pc, mb) - 1).to_le_bytes();
    push_stack(mb, addr_bytes[1]);
    push_stack(mb, addr_bytes[0]);
    reg!(set pc, mb, reg!(get addr, mb));
    adj_cycles!(mb, 1);
});
op_fn!(op_rti, mb, {
    let flags = pop_stack(mb);
    reg!(set status, mb, Status::from_bits_truncate(flags) | Status::UNUSED);
    let fst = pop_stack(mb);
    let snd = pop_stack(mb);
    reg!(set pc, mb, bytes_to_addr!(fst, snd));
    adj_cycles!(mb, 1);
});
op_fn!(op_rts, mb, {
    let fst = pop_stack(mb);
    let snd = pop_stack(mb);
    reg!(set pc, mb, bytes_to_addr!(fst, snd).wrapping_add(1));
    adj_cycles!(mb, 2);
});
//endregion

//region Loads
op_fn!(op_lda, mb, {
    reg!(set acc, mb, read(mb));
    check_zero(mb, reg!(get acc, mb));
    check_negative(mb, reg!(get acc, mb));
});
op_fn!(op_ldx, mb, {
    reg!(set x, mb, read(mb));
    check_zero(mb, reg!(get x, mb));
    check_negative(mb, reg!(get x, mb));
    match reg!(get addr_mode, mb) {
        AddressingMode::ZPX | AddressingMode::ZPY => adj_cycles!(mb, 1),
        _ => {}
    };
});
op_fn!(op_ldy, mb, {
    reg!(set y, mb, read(mb));
    check_zero(mb, reg!(get y, mb));
    check_negative(mb, reg!(get y, mb));
});
//endregion
op_fn!(op_nop, _mb, {});

//region Register instructions
op_fn!(op_tax, mb, {
    reg!(set x, mb, reg!(get acc, mb));
    check_zero(mb, reg!(get x, mb));
    check_negative(mb, reg!(get x, mb));
});
op_fn!(op_txa, mb, {
    reg!(set acc, mb, reg!(get x, mb));
    check_zero(mb, reg!(get acc, mb));
    check_negative(mb, reg!(get acc, mb));
});
op_fn!(op_tay, mb, {
    reg!(set y, mb, reg!(get acc, mb));
    check_zero(mb, reg!(get y, mb));
    check_negative(mb, reg!(get y, mb));
});
op_fn!(op_tya, mb, {
    reg!(set acc, mb, reg!(get y, mb));
    check_zero(mb, reg!(get acc, mb));
    check_negative(mb, reg!(get acc, mb));
});
op_fn!(op_inx, mb, {
    reg!(set x, mb, (Wrapping(reg!(get x, mb)) + Wrapping(1)).0);
    check_zero(mb, reg!(get x, mb));
    check_negative(mb, reg!(get x, mb));
});
op_fn!(op_dex, mb, {
    reg!(set x, mb, (Wrapping(reg!(get x, mb)) - Wrapping(1)).0);
    check_zero(mb, reg!(get x, mb));
    check_negative(mb, reg!(get x, mb));
});
op_fn!(op_iny, mb, {
    reg!(set y, mb, (Wrapping(reg!(get y, mb)) + Wrapping(1)).0);
    check_zero(mb, reg!(get y, mb));
    check_negative(mb, reg!(get y, mb));
});
op_fn!(op_dey, mb, {
    reg!(set y, mb, (Wrapping(reg!(get y, mb)) - Wrapping(1)).0);
    check_zero(mb, reg!(get y, mb));
    check_negative(mb, reg!(get y, mb));
});
//endregion

//region Storage instruction
op_fn!(op_sta, mb, {
    write(mb, reg!(get acc, mb));
    if mb.cpu().oops_cycle {
        adj_cycles!(mb, -1i32);
    }
    match reg!(get addr_mode, mb) {
        AddressingMode::IndY => adj_cycles!(mb, 1),
        AddressingMode::AbsX => adj_cycles!(mb, 1),
        AddressingMode::AbsY => adj_cycles!(mb, 1),
        _ => {}
    };
});
op_fn!(op_stx, mb, {
    write(mb, reg!(get x, mb));
    if reg!(get addr_mode, mb) == AddressingMode::ZPY {
        adj_cycles!(mb, 1);
    }
});
op_fn!(op_sty, mb, {
    write(mb, reg!(get y, mb));
});
op_fn!(op_stz, mb, {
    write(mb, 0);
    if mb.cpu().oops_cycle {
        adj_cycles!(mb, -1i32);
    }
    if reg!(get addr_mode, mb) == AddressingMode::AbsX {
        adj_cycles!(mb, 1);
    }
});
//endregion

//region Stack instructions
op_fn!(op_txs, mb, {
    reg!(set stack, mb, reg!(get x, mb));
});
op_fn!(op_tsx, mb, {
    reg!(set x, mb, reg!(get stack, mb));
    check_zero(mb, reg!(get x, mb));
    check_negative(mb, reg!(get x, mb));
});
op_fn!(op_pha, mb, {
    push_stack(mb, reg!(get acc, mb));
});
op_fn!(op_pla, mb, {
    reg!(set acc, mb, pop_stack(mb));
    check_zero(mb, reg!(get acc, mb));
    check_negative(mb, reg!(get acc, mb));
    adj_cycles!(mb, 1);
});
op_fn!(op_php, mb, {
    push_stack(mb, reg!(get status, mb).bits() | 0x30)
});
op_fn!(op_plp, mb, {
    reg!(set status, mb, Status::from_bits_truncate((pop_stack(mb) & 0xEF) | 0x20));
    adj_cycles!(mb, 1);
});
op_fn!(op_phx, mb, {
    push_stack(mb, reg!(get x, mb));
});
op_fn!(op_plx, mb, {
    reg!(set x, mb, pop_stack(mb));
    check_zero(mb, reg!(get x, mb));
    check_negative(mb, reg!(get x, mb));
    adj_cycles!(mb, 1);
});
op_fn!(op_phy, mb, {
    push_stack(mb, reg!(get y, mb));
});
op_fn!(op_ply, mb, {
    reg!(set y, mb, pop_stack(mb));
    check_zero(mb, reg!(get y, mb));
    check_negative(mb, reg!(get y, mb));
    adj_cycles!(mb, 1);
});
//endregion

//region 65C02 bit-test instructions
op_fn!(op_trb, mb, {
    let op = read(mb);
    let res = reg!(get acc, mb) & op;
    check_zero(mb, res);
    adj_cycles!(mb, 1);
    write(mb, op & !reg!(get acc, mb));
});
op_fn!(op_tsb, mb, {
    let op = read(mb);
    let res = reg!(get acc, mb) & op;
    check_zero(mb, res);
    adj_cycles!(mb, 1);
    write(mb, op | reg!(get acc, mb));
});
//endregion
