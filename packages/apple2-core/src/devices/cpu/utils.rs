use super::super::bus::Motherboard;
use super::{
    cpu::WithCpu,
    structs::{AddressingMode, Instruction},
};

#[macro_export]
macro_rules! bytes_to_addr {
    ($fst: expr, $snd: expr) => {{
        (u16::from($snd) << 8) | u16::from($fst)
    }};
}

#[macro_export]
macro_rules! bus {
    (read $mb: expr, $addr: expr) => {{
        $mb.cpu_mut().cycles += 1;
        $mb.read($addr)
    }};
    (write $mb: expr, $addr: expr, $data: expr) => {{
        $mb.cpu_mut().cycles += 1;
        $mb.write($addr, $data)
    }};
}

#[macro_export]
macro_rules! adj_cycles {
    ($mb: expr, $delta: expr) => {{
        $mb.cpu_mut().cycles = $mb.cpu_mut().cycles.wrapping_add($delta as u32)
    }};
}

#[macro_export]
macro_rules! reg {
    (get $reg: ident, $mb: expr) => {{
        $mb.cpu().state.$reg
    }};

    (set $reg: ident, $mb: expr, $val: expr) => {{
        $mb.cpu_mut().state.$reg = $val
    }};

    (add $reg: ident, $mb: expr, $val: expr) => {{
        $mb.cpu_mut().state.$reg = $mb.cpu().state.$reg.wrapping_add($val)
    }};

    (sub $reg: ident, $mb: expr, $val: expr) => {{
        $mb.cpu_mut().state.$reg = $mb.cpu().state.$reg.wrapping_sub($val)
    }};
}

pub fn print_debug<T: WithCpu + Motherboard>(mb: &T) -> String {
    let bytes = reg!(get instruction, mb).to_le_bytes();
    let ops = match reg!(get addr_mode, mb) {
        AddressingMode::Abs
        | AddressingMode::AbsX
        | AddressingMode::AbsY
        | AddressingMode::AbsInd => format!("{:02X} {:02X} {:02X}", bytes[0], bytes[1], bytes[2]),
        AddressingMode::Accum | AddressingMode::Impl => format!("{:8<02X}", bytes[0]),
        _ => format!("{:02X} {:02X}   ", bytes[0], bytes[1]),
    };

    let operand_bytes = bytes_to_addr!(bytes[1], bytes[2]);
    let data = mb.peek(reg!(get addr, mb)).unwrap_or(0xA5); // 0xA5 is a debug pattern
    let addr = reg!(get addr, mb);
    let instr = reg!(get instr, mb);
    let is_jmp = instr == Instruction::JMP || instr == Instruction::JSR;
    let instr = match reg!(get addr_mode, mb) {
        AddressingMode::Abs => {
            if !is_jmp {
                format!("{:3?} ${:04X} = {:02X}", instr, addr, data)
            } else {
                format!("{:3?} ${:04X}", instr, addr)
            }
        }
        AddressingMode::AbsX => format!(
            "{:3?} ${:04X},X @ {:04X} = {:02X}",
            instr, operand_bytes, addr, data
        ),
        AddressingMode::AbsY => format!(
            "{:3?} ${:04X},Y @ {:04X} = {:02X}",
            instr, operand_bytes, addr, data
        ),
        AddressingMode::AbsInd => format!("{:3?} (${:04X}) = {:04X}", instr, operand_bytes, addr),
        AddressingMode::Accum => format!("{:3?} A", instr),
        AddressingMode::Imm => format!("{:3?} #${:02X}", instr, bytes[1]),
        AddressingMode::Impl => format!("{:3?}", instr),
        AddressingMode::IndX => format!(
            "{:3?} (${:02X},X) @ {:04X} = {:02X}",
            instr, bytes[1], addr, data
        ),
        AddressingMode::IndY => format!(
            "{:3?} (${:02X}),Y @ {:04X} = {:02X}",
            instr, bytes[1], addr, data
        ),
        AddressingMode::Rel => format!("{:3?} ${:04X}", instr, addr),
        AddressingMode::ZP => format!("{:3?} ${:02X} = {:02X}", instr, bytes[1], data),
        AddressingMode::ZPX => format!("{:3?} ${:02X},X @ {:02X} = {:02X}", instr, bytes[1], addr, data),
        AddressingMode::ZPY => format!("{:3?} ${:02X},Y @ {:02X} = {:02X}", instr, bytes[1], addr, data),
    };

    format!(
        "{:04X}  {}  {:30} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
        reg!(get pc, mb),
        ops,
        instr,
        reg!(get acc, mb),
        reg!(get x, mb),
        reg!(get y, mb),
        reg!(get status, mb).bits(),
        reg!(get stack, mb),
        reg!(get tot_cycles, mb)
    )
}

/// The byte size implied by an addressing mode, matching the opcode
/// descriptor's {1,2,3}-byte-size contract.
pub fn addressing_mode_size(mode: AddressingMode) -> u8 {
    match mode {
        AddressingMode::Impl | AddressingMode::Accum => 1,
        AddressingMode::Imm
        | AddressingMode::ZP
        | AddressingMode::ZPX
        | AddressingMode::ZPY
        | AddressingMode::Rel
        | AddressingMode::IndX
        | AddressingMode::IndY => 2,
        AddressingMode::Abs | AddressingMode::AbsX | AddressingMode::AbsY | AddressingMode::AbsInd => 3,
    }
}

/// Decodes an opcode byte into an (addressing mode, mnemonic) pair for the
/// NMOS 6502 found in the Apple ][ and ][+.
///
/// Slots with no defined NMOS behavior decode as `Instruction::Invalid`,
/// carrying implied addressing so the CPU can still burn a cycle and move on
/// under the permissive `OpcodePolicy`.
pub fn decode_instruction_nmos(instr: u8) -> (AddressingMode, Instruction) {
    use AddressingMode::*;
    use Instruction::*;
    match instr {
        0x00 => (Impl, BRK),
        0x01 => (IndX, ORA),
        0x05 => (ZP, ORA),
        0x06 => (ZP, ASL),
        0x08 => (Impl, PHP),
        0x09 => (Imm, ORA),
        0x0A => (Accum, ASL),
        0x0D => (Abs, ORA),
        0x0E => (Abs, ASL),

        0x10 => (Rel, BPL),
        0x11 => (IndY, ORA),
        0x15 => (ZPX, ORA),
        0x16 => (ZPX, ASL),
        0x18 => (Impl, CLC),
        0x19 => (AbsY, ORA),
        0x1D => (AbsX, ORA),
        0x1E => (AbsX, ASL),

        0x20 => (Abs, JSR),
        0x21 => (IndX, AND),
        0x24 => (ZP, BIT),
        0x25 => (ZP, AND),
        0x26 => (ZP, ROL),
        0x28 => (Impl, PLP),
        0x29 => (Imm, AND),
        0x2A => (Accum, ROL),
        0x2C => (Abs, BIT),
        0x2D => (Abs, AND),
        0x2E => (Abs, ROL),

        0x30 => (Rel, BMI),
        0x31 => (IndY, AND),
        0x35 => (ZPX, AND),
        0x36 => (ZPX, ROL),
        0x38 => (Impl, SEC),
        0x39 => (AbsY, AND),
        0x3D => (AbsX, AND),
        0x3E => (AbsX, ROL),

        0x40 => (Impl, RTI),
        0x41 => (IndX, EOR),
        0x45 => (ZP, EOR),
        0x46 => (ZP, LSR),
        0x48 => (Impl, PHA),
        0x49 => (Imm, EOR),
        0x4A => (Accum, LSR),
        0x4C => (Abs, JMP),
        0x4D => (Abs, EOR),
        0x4E => (Abs, LSR),

        0x50 => (Rel, BVC),
        0x51 => (IndY, EOR),
        0x55 => (ZPX, EOR),
        0x56 => (ZPX, LSR),
        0x58 => (Impl, CLI),
        0x59 => (AbsY, EOR),
        0x5D => (AbsX, EOR),
        0x5E => (AbsX, LSR),

        0x60 => (Impl, RTS),
        0x61 => (IndX, ADC),
        0x65 => (ZP, ADC),
        0x66 => (ZP, ROR),
        0x68 => (Impl, PLA),
        0x69 => (Imm, ADC),
        0x6A => (Accum, ROR),
        0x6C => (AbsInd, JMP),
        0x6D => (Abs, ADC),
        0x6E => (Abs, ROR),

        0x70 => (Rel, BVS),
        0x71 => (IndY, ADC),
        0x75 => (ZPX, ADC),
        0x76 => (ZPX, ROR),
        0x78 => (Impl, SEI),
        0x79 => (AbsY, ADC),
        0x7D => (AbsX, ADC),
        0x7E => (AbsX, ROR),

        0x81 => (IndX, STA),
        0x84 => (ZP, STY),
        0x85 => (ZP, STA),
        0x86 => (ZP, STX),
        0x88 => (Impl, DEY),
        0x8A => (Impl, TXA),
        0x8C => (Abs, STY),
        0x8D => (Abs, STA),
        0x8E => (Abs, STX),

        0x90 => (Rel, BCC),
        0x91 => (IndY, STA),
        0x94 => (ZPX, STY),
        0x95 => (ZPX, STA),
        0x96 => (ZPY, STX),
        0x98 => (Impl, TYA),
        0x99 => (AbsY, STA),
        0x9A => (Impl, TXS),
        0x9D => (AbsX, STA),

        0xA0 => (Imm, LDY),
        0xA1 => (IndX, LDA),
        0xA2 => (Imm, LDX),
        0xA4 => (ZP, LDY),
        0xA5 => (ZP, LDA),
        0xA6 => (ZP, LDX),
        0xA8 => (Impl, TAY),
        0xA9 => (Imm, LDA),
        0xAA => (Impl, TAX),
        0xAC => (Abs, LDY),
        0xAD => (Abs, LDA),
        0xAE => (Abs, LDX),

        0xB0 => (Rel, BCS),
        0xB1 => (IndY, LDA),
        0xB4 => (ZPX, LDY),
        0xB5 => (ZPX, LDA),
        0xB6 => (ZPY, LDX),
        0xB8 => (Impl, CLV),
        0xB9 => (AbsY, LDA),
        0xBA => (Impl, TSX),
        0xBC => (AbsX, LDY),
        0xBD => (AbsX, LDA),
        0xBE => (AbsY, LDX),

        0xC0 => (Imm, CPY),
        0xC1 => (IndX, CMP),
        0xC4 => (ZP, CPY),
        0xC5 => (ZP, CMP),
        0xC6 => (ZP, DEC),
        0xC8 => (Impl, INY),
        0xC9 => (Imm, CMP),
        0xCA => (Impl, DEX),
        0xCC => (Abs, CPY),
        0xCD => (Abs, CMP),
        0xCE => (Abs, DEC),

        0xD0 => (Rel, BNE),
        0xD1 => (IndY, CMP),
        0xD5 => (ZPX, CMP),
        0xD6 => (ZPX, DEC),
        0xD8 => (Impl, CLD),
        0xD9 => (AbsY, CMP),
        0xDD => (AbsX, CMP),
        0xDE => (AbsX, DEC),

        0xE0 => (Imm, CPX),
        0xE1 => (IndX, SBC),
        0xE4 => (ZP, CPX),
        0xE5 => (ZP, SBC),
        0xE6 => (ZP, INC),
        0xE8 => (Impl, INX),
        0xE9 => (Imm, SBC),
        0xEA => (Impl, NOP),
        0xEC => (Abs, CPX),
        0xED => (Abs, SBC),
        0xEE => (Abs, INC),

        0xF0 => (Rel, BEQ),
        0xF1 => (IndY, SBC),
        0xF5 => (ZPX, SBC),
        0xF6 => (ZPX, INC),
        0xF8 => (Impl, SED),
        0xF9 => (AbsY, SBC),
        0xFD => (AbsX, SBC),
        0xFE => (AbsX, INC),

        _ => (Impl, Invalid),
    }
}

/// Decodes an opcode byte for the 65C02 found in the Apple ][e Enhanced.
///
/// Starts from the NMOS table and layers in the CMOS-only additions that
/// fit the addressing modes this implementation resolves: BRA, PHX/PHY/
/// PLX/PLY, STZ, TRB/TSB, accumulator-mode INC/DEC, and immediate/indexed
/// BIT. The NMOS indirect-JMP page-wrap bug does not apply on this table;
/// the CPU core checks the variant directly rather than re-deriving it here.
pub fn decode_instruction_cmos(instr: u8) -> (AddressingMode, Instruction) {
    use AddressingMode::*;
    use Instruction::*;
    match instr {
        0x04 => (ZP, TSB),
        0x0C => (Abs, TSB),
        0x14 => (ZP, TRB),
        0x1A => (Accum, INC),
        0x1C => (Abs, TRB),
        0x34 => (ZPX, BIT),
        0x3A => (Accum, DEC),
        0x3C => (AbsX, BIT),
        0x5A => (Impl, PHY),
        0x64 => (ZP, STZ),
        0x74 => (ZPX, STZ),
        0x7A => (Impl, PLY),
        0x80 => (Rel, BRA),
        0x89 => (Imm, BIT),
        0x9C => (Abs, STZ),
        0x9E => (AbsX, STZ),
        0xDA => (Impl, PHX),
        0xFA => (Impl, PLX),
        other => decode_instruction_nmos(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nmos_instruction_correctly() {
        let res = decode_instruction_nmos(0xEA);
        assert_eq!(res.0, AddressingMode::Impl);
        assert_eq!(res.1, Instruction::NOP);
    }

    #[test]
    fn decodes_nmos_unmapped_opcode_as_invalid() {
        let res = decode_instruction_nmos(0x02);
        assert_eq!(res.0, AddressingMode::Impl);
        assert_eq!(res.1, Instruction::Invalid);
    }

    #[test]
    fn decodes_cmos_bra() {
        let res = decode_instruction_cmos(0x80);
        assert_eq!(res.0, AddressingMode::Rel);
        assert_eq!(res.1, Instruction::BRA);
    }

    #[test]
    fn cmos_falls_back_to_nmos_table_for_shared_opcodes() {
        let res = decode_instruction_cmos(0xA9);
        assert_eq!(res.0, AddressingMode::Imm);
        assert_eq!(res.1, Instruction::LDA);
    }

    #[test]
    fn addressing_mode_size_matches_spec_byte_sizes() {
        assert_eq!(addressing_mode_size(AddressingMode::Impl), 1);
        assert_eq!(addressing_mode_size(AddressingMode::ZP), 2);
        assert_eq!(addressing_mode_size(AddressingMode::Abs), 3);
    }
}
