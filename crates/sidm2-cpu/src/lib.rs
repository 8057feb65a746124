//! 6502 CPU emulation for SID music players.
//!
//! This crate provides everything needed to run C64 player code outside
//! of a C64 and to produce new player code:
//!
//! - [`Cpu`] - the documented NMOS 6502 instruction set over a [`Bus`]
//! - [`SidBus`] - flat RAM with the SID register page intercepted
//! - [`Emulator`] - init/play call sequencing, frame stepping, faults
//! - [`decode_instruction`] - static decoder for relocation scanning
//! - [`Assembler`] - label-based code emitter with relocation records
//!
//! # Example
//!
//! ```
//! use sidm2_common::{Address, MemoryImage};
//! use sidm2_cpu::{Emulator, EmulatorConfig, SidProgram};
//!
//! // init: RTS / play: LDA #$0F; STA $D418; RTS
//! let image = MemoryImage::new(Address(0x1000), vec![0x60, 0xA9, 0x0F, 0x8D, 0x18, 0xD4, 0x60]);
//! let program = SidProgram {
//!     image,
//!     init: Address(0x1000),
//!     play: Address(0x1001),
//!     subtune: 0,
//! };
//! let trace = Emulator::trace(&program, 2, &EmulatorConfig::default());
//! assert_eq!(trace.frames_completed(), 2);
//! assert_eq!(trace.frame_writes(1)[0].register, 0x18);
//! ```

#![warn(missing_docs)]

pub mod asm;
mod bus;
mod cpu;
mod emulator;
pub mod opcodes;

pub use asm::{Assembled, Assembler, AsmError, Relocation, RelocationKind, Target};
pub use bus::{Bus, SidBus};
pub use cpu::{Cpu, Executed, IRQ_VECTOR, IllegalOpcode, Registers, STACK_BASE, Status};
pub use emulator::{
    Emulator, EmulatorConfig, EmulatorState, FrameStats, KERNAL_IRQ_EXIT, KERNAL_IRQ_RESTORE,
    KERNAL_IRQ_VECTOR, RETURN_TRAP, SidProgram, VideoStandard,
};
pub use opcodes::{AddressingMode, Instruction, Mnemonic, Opcode, decode_instruction};
