mod cpu;
mod structs;
mod utils;

pub use cpu::{debug, exec, reset, step, tick, trigger_irq, trigger_nmi, Cpu6502, WithCpu};
pub use structs::{AddressingMode, CpuState, CpuVariant, Instruction, OpcodePolicy, Status};
pub use utils::{addressing_mode_size, decode_instruction_cmos, decode_instruction_nmos, print_debug};
