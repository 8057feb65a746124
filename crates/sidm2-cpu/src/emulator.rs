//! Frame-stepping player emulation.
//!
//! A player is driven the way a C64 music routine expects: the init
//! routine is called once with the subtune in A, then the play routine is
//! called once per frame. Players that install an IRQ handler instead of
//! exposing a play address (play address 0) are driven through their
//! interrupt vector, with the KERNAL exit path stubbed in RAM.

use serde::{Deserialize, Serialize};
use sidm2_common::{
    Address, Fault, MemoryImage, NTSC_CYCLES_PER_FRAME, PAL_CYCLES_PER_FRAME, RegisterWrite, Trace,
};

use crate::bus::SidBus;
use crate::cpu::{Cpu, Executed, IRQ_VECTOR};

/// Returning to this address ends an emulated call.
///
/// A subroutine call pushes `RETURN_TRAP - 1` so that RTS lands here; an
/// interrupt-style call pushes it verbatim for RTI.
pub const RETURN_TRAP: u16 = 0x0001;

/// KERNAL software IRQ vector.
pub const KERNAL_IRQ_VECTOR: u16 = 0x0314;

/// KERNAL IRQ exit that scans the keyboard before restoring registers.
pub const KERNAL_IRQ_EXIT: u16 = 0xEA31;

/// KERNAL IRQ exit that only restores registers.
pub const KERNAL_IRQ_RESTORE: u16 = 0xEA81;

/// PLA; TAY; PLA; TAX; PLA; RTI
const RESTORE_STUB: [u8; 6] = [0x68, 0xA8, 0x68, 0xAA, 0x68, 0x40];

/// Video timing the player is clocked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoStandard {
    /// 50 Hz, 19656 cycles per frame.
    #[default]
    Pal,
    /// 60 Hz, 17095 cycles per frame.
    Ntsc,
}

impl VideoStandard {
    /// CPU cycles in one frame.
    pub const fn cycles_per_frame(self) -> u32 {
        match self {
            VideoStandard::Pal => PAL_CYCLES_PER_FRAME,
            VideoStandard::Ntsc => NTSC_CYCLES_PER_FRAME,
        }
    }
}

/// Emulation limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Frame timing.
    pub video: VideoStandard,
    /// Maximum instructions one play call may execute.
    pub frame_instruction_budget: u32,
    /// Maximum instructions the init call may execute. Init routines
    /// often clear or decompress memory, so this is much larger.
    pub init_instruction_budget: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            video: VideoStandard::Pal,
            frame_instruction_budget: 100_000,
            init_instruction_budget: 2_000_000,
        }
    }
}

/// A loadable player: image plus entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidProgram {
    /// Code and data.
    pub image: MemoryImage,
    /// Init routine.
    pub init: Address,
    /// Play routine, or [`Address::ZERO`] for IRQ-installed players.
    pub play: Address,
    /// Subtune passed to init in A (0-based).
    pub subtune: u8,
}

/// Lifecycle of an [`Emulator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorState {
    /// Loaded, init not yet started.
    Reset,
    /// Init routine running.
    Init,
    /// Init done; each frame runs the play routine once.
    Playing,
    /// Stopped by a fault; every further call returns it.
    Halted(Fault),
}

/// Summary of one emulated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame index.
    pub frame: u32,
    /// Cycles spent in the frame (init included for frame 0).
    pub cycles: u32,
    /// Instructions executed.
    pub instructions: u32,
    /// Whether the play routine ran longer than one frame's cycles.
    pub overran: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallStyle {
    Subroutine,
    Interrupt,
    KernalInterrupt,
}

#[derive(Debug, Clone, Copy)]
struct ActiveCall {
    entry: Address,
    budget: u32,
    remaining: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Advance {
    cycles: u32,
    frame_done: bool,
}

/// 6502 + SID bus driving one player.
pub struct Emulator {
    cpu: Cpu,
    bus: SidBus,
    config: EmulatorConfig,
    image_start: Address,
    image_end: u32,
    init: Address,
    play: Address,
    subtune: u8,
    play_entry: Option<(Address, CallStyle)>,
    state: EmulatorState,
    call: Option<ActiveCall>,
    frame: u32,
    frame_cycles: u32,
    frame_instructions: u32,
    play_started_at: u32,
    stepped_writes: Vec<RegisterWrite>,
}

impl Emulator {
    /// Map a program into a fresh machine. Nothing executes until the
    /// first step or frame.
    pub fn load(program: &SidProgram, config: EmulatorConfig) -> Self {
        let mut bus = SidBus::new();
        bus.load_image(&program.image);

        let image = &program.image;
        let covers = |addr: u16, len: usize| {
            (0..len).any(|i| image.contains(Address(addr.wrapping_add(i as u16))))
        };
        if !covers(KERNAL_IRQ_RESTORE, RESTORE_STUB.len()) {
            bus.poke_slice(Address(KERNAL_IRQ_RESTORE), &RESTORE_STUB);
        }
        if !covers(KERNAL_IRQ_EXIT, 3) {
            let jmp = [0x4C, KERNAL_IRQ_RESTORE as u8, (KERNAL_IRQ_RESTORE >> 8) as u8];
            bus.poke_slice(Address(KERNAL_IRQ_EXIT), &jmp);
        }

        Self {
            cpu: Cpu::new(),
            bus,
            config,
            image_start: image.load(),
            image_end: image.end(),
            init: program.init,
            play: program.play,
            subtune: program.subtune,
            play_entry: None,
            state: EmulatorState::Reset,
            call: None,
            frame: 0,
            frame_cycles: 0,
            frame_instructions: 0,
            play_started_at: 0,
            stepped_writes: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &EmulatorState {
        &self.state
    }

    /// Index of the frame currently executing (or next to execute).
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Configuration in effect.
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Whole 64 KiB RAM (SID page reads as stored RAM, i.e. untouched).
    pub fn memory(&self) -> &[u8] {
        self.bus.memory()
    }

    /// CPU core (registers, cycle counter).
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Execute a single instruction, starting the init or play call when
    /// none is active. SID writes are buffered; see
    /// [`Emulator::take_stepped_writes`].
    pub fn step_instruction(&mut self) -> Result<u32, Fault> {
        let mut buffered = std::mem::take(&mut self.stepped_writes);
        let result = self.advance(&mut |w| buffered.push(w), &mut |_| {});
        self.stepped_writes = buffered;
        result.map(|a| a.cycles)
    }

    /// SID writes produced by [`Emulator::step_instruction`] so far.
    pub fn take_stepped_writes(&mut self) -> Vec<RegisterWrite> {
        std::mem::take(&mut self.stepped_writes)
    }

    /// Run until the current frame's play call returns. Frame 0 includes
    /// the init call.
    ///
    /// The video standard's cycle budget is only reported: a play call
    /// that runs past it still completes, with [`FrameStats::overran`] set.
    /// Only the instruction budget stops execution.
    pub fn run_frame(&mut self, sink: &mut dyn FnMut(RegisterWrite)) -> Result<FrameStats, Fault> {
        self.run_frame_observed(sink, &mut |_| {})
    }

    /// Like [`Emulator::run_frame`], also reporting every executed
    /// instruction to `observer`.
    pub fn run_frame_observed(
        &mut self,
        sink: &mut dyn FnMut(RegisterWrite),
        observer: &mut dyn FnMut(&Executed),
    ) -> Result<FrameStats, Fault> {
        let frame = self.frame;
        loop {
            let before_cycles = self.frame_cycles;
            let before_instructions = self.frame_instructions;
            let before_play = self.play_started_at;
            let step = self.advance(sink, observer)?;
            if step.frame_done {
                let play_cycles = (before_cycles + step.cycles).saturating_sub(before_play);
                let overran = play_cycles > self.config.video.cycles_per_frame();
                if overran {
                    tracing::debug!(
                        frame,
                        cycles = play_cycles,
                        limit = self.config.video.cycles_per_frame(),
                        "play routine overran its frame"
                    );
                }
                let last = u32::from(step.cycles > 0);
                return Ok(FrameStats {
                    frame,
                    cycles: before_cycles + step.cycles,
                    instructions: before_instructions + last,
                    overran,
                });
            }
        }
    }

    /// Emulate `frames` frames of a program and collect the trace.
    ///
    /// A fault truncates the trace at the faulting frame instead of
    /// failing; the fault is recorded in the trace.
    pub fn trace(program: &SidProgram, frames: u32, config: &EmulatorConfig) -> Trace {
        let mut emulator = Emulator::load(program, config.clone());
        let mut trace = Trace::new(frames);
        for _ in 0..frames {
            let frame_start = trace.writes().len();
            let result = emulator.run_frame(&mut |w| trace.push(w));
            match result {
                Ok(_) => trace.close_frame(frame_start),
                Err(fault) => {
                    trace.halt(fault);
                    break;
                }
            }
        }
        trace
    }

    fn in_image(&self, addr: u16) -> bool {
        addr >= self.image_start.get() && (addr as u32) < self.image_end
    }

    fn resolve_play_entry(&self) -> Option<(Address, CallStyle)> {
        if self.play != Address::ZERO {
            return Some((self.play, CallStyle::Subroutine));
        }
        let kernal = self.bus.peek_word(KERNAL_IRQ_VECTOR);
        if self.in_image(kernal) {
            return Some((Address(kernal), CallStyle::KernalInterrupt));
        }
        let hardware = self.bus.peek_word(IRQ_VECTOR);
        if hardware != 0 {
            return Some((Address(hardware), CallStyle::Interrupt));
        }
        tracing::warn!("player has no play address and installed no IRQ handler");
        None
    }

    fn begin_call(&mut self, entry: Address, style: CallStyle, budget: u32) {
        self.cpu.registers_mut().sp = 0xFF;
        match style {
            CallStyle::Subroutine => {
                let ret = RETURN_TRAP.wrapping_sub(1);
                self.cpu.push(&mut self.bus, (ret >> 8) as u8);
                self.cpu.push(&mut self.bus, ret as u8);
                self.cpu.registers_mut().pc = entry.get();
            }
            CallStyle::Interrupt => {
                self.cpu.interrupt(&mut self.bus, RETURN_TRAP, entry.get());
            }
            CallStyle::KernalInterrupt => {
                self.cpu.interrupt(&mut self.bus, RETURN_TRAP, entry.get());
                let regs = *self.cpu.registers();
                self.cpu.push(&mut self.bus, regs.a);
                self.cpu.push(&mut self.bus, regs.x);
                self.cpu.push(&mut self.bus, regs.y);
            }
        }
        self.call = Some(ActiveCall {
            entry,
            budget,
            remaining: budget,
        });
    }

    fn halt(&mut self, fault: Fault) -> Fault {
        tracing::debug!(%fault, "emulation halted");
        self.state = EmulatorState::Halted(fault.clone());
        self.call = None;
        fault
    }

    fn finish_frame(&mut self) -> Advance {
        self.frame += 1;
        self.frame_cycles = 0;
        self.frame_instructions = 0;
        self.play_started_at = 0;
        Advance {
            cycles: 0,
            frame_done: true,
        }
    }

    /// One scheduling step: start a call if needed, then run one
    /// instruction of it.
    fn advance(
        &mut self,
        sink: &mut dyn FnMut(RegisterWrite),
        observer: &mut dyn FnMut(&Executed),
    ) -> Result<Advance, Fault> {
        if let EmulatorState::Halted(fault) = &self.state {
            return Err(fault.clone());
        }

        if self.call.is_none() {
            match self.state {
                EmulatorState::Reset => {
                    self.state = EmulatorState::Init;
                    if self.init == Address::ZERO {
                        let from = self.init;
                        return Err(self.halt(Fault::ExecutionAtZero {
                            frame: self.frame,
                            from,
                        }));
                    }
                    let budget = self.config.init_instruction_budget;
                    self.begin_call(self.init, CallStyle::Subroutine, budget);
                    let regs = self.cpu.registers_mut();
                    regs.a = self.subtune;
                    regs.x = 0;
                    regs.y = 0;
                }
                EmulatorState::Init => {
                    self.enter_playing();
                }
                EmulatorState::Playing => {}
                EmulatorState::Halted(_) => {}
            }
        }

        if self.call.is_none() {
            // Playing with no call active: start this frame's play call.
            match self.play_entry {
                Some((entry, style)) => {
                    self.play_started_at = self.frame_cycles;
                    let budget = self.config.frame_instruction_budget;
                    self.begin_call(entry, style, budget);
                }
                None => return Ok(self.finish_frame()),
            }
        }

        let cycles = self.execute_one(sink, observer)?;
        if self.call.is_none() {
            match self.state {
                EmulatorState::Init => self.enter_playing(),
                EmulatorState::Playing => {
                    let mut done = self.finish_frame();
                    done.cycles = cycles;
                    return Ok(done);
                }
                _ => {}
            }
        }
        Ok(Advance {
            cycles,
            frame_done: false,
        })
    }

    fn enter_playing(&mut self) {
        self.state = EmulatorState::Playing;
        self.play_entry = self.resolve_play_entry();
    }

    fn execute_one(
        &mut self,
        sink: &mut dyn FnMut(RegisterWrite),
        observer: &mut dyn FnMut(&Executed),
    ) -> Result<u32, Fault> {
        let frame = self.frame;
        let Some(call) = self.call.as_mut() else {
            return Ok(0);
        };
        if call.remaining == 0 {
            let fault = Fault::InstructionBudget {
                frame,
                entry: call.entry,
                budget: call.budget,
            };
            return Err(self.halt(fault));
        }
        call.remaining -= 1;

        let executed = match self.cpu.step(&mut self.bus) {
            Ok(executed) => executed,
            Err(illegal) => {
                return Err(self.halt(Fault::IllegalOpcode {
                    frame,
                    opcode: illegal.opcode,
                    address: illegal.address,
                }));
            }
        };
        self.frame_cycles += executed.cycles;
        self.frame_instructions += 1;

        let cycle = self.frame_cycles;
        for (register, value) in self.bus.drain_writes() {
            sink(RegisterWrite {
                frame,
                cycle,
                register,
                value,
            });
        }
        observer(&executed);

        match self.cpu.registers().pc {
            RETURN_TRAP => self.call = None,
            0 => {
                return Err(self.halt(Fault::ExecutionAtZero {
                    frame,
                    from: executed.pc,
                }));
            }
            _ => {}
        }
        Ok(executed.cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// init: LDA #$0F; STA $D418; RTS
    /// play: INC $1080; LDA $1080; STA $D400; RTS
    fn counter_program() -> SidProgram {
        let mut bytes = vec![0u8; 0x81];
        bytes[..6].copy_from_slice(&[0xA9, 0x0F, 0x8D, 0x18, 0xD4, 0x60]);
        bytes[0x10..0x1A].copy_from_slice(&[
            0xEE, 0x80, 0x10, 0xAD, 0x80, 0x10, 0x8D, 0x00, 0xD4, 0x60,
        ]);
        SidProgram {
            image: MemoryImage::new(Address(0x1000), bytes),
            init: Address(0x1000),
            play: Address(0x1010),
            subtune: 0,
        }
    }

    #[test]
    fn init_writes_belong_to_frame_zero() {
        let trace = Emulator::trace(&counter_program(), 3, &EmulatorConfig::default());
        assert_eq!(trace.frames_completed(), 3);
        assert_eq!(trace.writes_per_frame(), vec![2, 1, 1]);
        assert_eq!(trace.frame_writes(0)[0].register, 0x18);
        assert_eq!(trace.frame_writes(2)[0].value, 3);
        assert!(!trace.is_truncated());
    }

    #[test]
    fn state_machine_progresses_through_init() {
        let mut emu = Emulator::load(&counter_program(), EmulatorConfig::default());
        assert_eq!(*emu.state(), EmulatorState::Reset);
        emu.step_instruction().unwrap();
        assert_eq!(*emu.state(), EmulatorState::Init);
        while *emu.state() == EmulatorState::Init {
            emu.step_instruction().unwrap();
        }
        assert_eq!(*emu.state(), EmulatorState::Playing);
        assert_eq!(emu.take_stepped_writes().len(), 1);
    }

    #[test]
    fn endless_loop_hits_the_budget() {
        let mut program = counter_program();
        // play: JMP play
        program.image.bytes_mut()[0x10..0x13].copy_from_slice(&[0x4C, 0x10, 0x10]);
        let config = EmulatorConfig {
            frame_instruction_budget: 500,
            ..EmulatorConfig::default()
        };
        let trace = Emulator::trace(&program, 10, &config);
        assert_eq!(trace.frames_completed(), 0);
        let fault = trace.fault().unwrap();
        assert!(fault.is_timeout());
        assert_eq!(fault.address(), Address(0x1010));
    }

    #[test]
    fn slow_play_routine_overruns_without_stopping() {
        let mut program = counter_program();
        // play: LDX #$20; LDY #0; DEY; BNE *-1; DEX; BNE *-6; RTS
        program.image.bytes_mut()[0x10..0x1B].copy_from_slice(&[
            0xA2, 0x20, 0xA0, 0x00, 0x88, 0xD0, 0xFD, 0xCA, 0xD0, 0xF8, 0x60,
        ]);
        let mut emu = Emulator::load(&program, EmulatorConfig::default());
        let mut writes = 0;
        for frame in 0..3 {
            let stats = emu.run_frame(&mut |_| writes += 1).unwrap();
            assert_eq!(stats.frame, frame);
            assert!(stats.overran, "frame {frame}");
            assert!(stats.cycles > VideoStandard::Pal.cycles_per_frame());
        }
        assert_eq!(writes, 1);

        let mut quick = Emulator::load(&counter_program(), EmulatorConfig::default());
        assert!(!quick.run_frame(&mut |_| {}).unwrap().overran);
    }

    #[test]
    fn jump_to_zero_is_a_fault() {
        let mut program = counter_program();
        program.image.bytes_mut()[0x10..0x13].copy_from_slice(&[0x4C, 0x00, 0x00]);
        let mut emu = Emulator::load(&program, EmulatorConfig::default());
        let err = emu.run_frame(&mut |_| {}).unwrap_err();
        assert_eq!(
            err,
            Fault::ExecutionAtZero {
                frame: 0,
                from: Address(0x1010)
            }
        );
        assert!(matches!(emu.state(), EmulatorState::Halted(_)));
        assert_eq!(emu.run_frame(&mut |_| {}), Err(err));
    }

    #[test]
    fn irq_installed_player_runs_through_kernal_vector() {
        // init: LDA #<irq; STA $0314; LDA #>irq; STA $0315; RTS
        // irq:  INC $D400; JMP $EA31
        let mut bytes = vec![0u8; 0x20];
        bytes[..11].copy_from_slice(&[
            0xA9, 0x10, 0x8D, 0x14, 0x03, 0xA9, 0x10, 0x8D, 0x15, 0x03, 0x60,
        ]);
        bytes[0x10..0x16].copy_from_slice(&[0xEE, 0x00, 0xD4, 0x4C, 0x31, 0xEA]);
        let program = SidProgram {
            image: MemoryImage::new(Address(0x1000), bytes),
            init: Address(0x1000),
            play: Address::ZERO,
            subtune: 0,
        };
        let trace = Emulator::trace(&program, 4, &EmulatorConfig::default());
        assert_eq!(trace.frames_completed(), 4);
        assert!(trace.fault().is_none());
        // INC on a write-only register reads 0 and writes 1 every frame.
        assert!(trace.writes().iter().all(|w| w.register == 0 && w.value == 1));
    }

    #[test]
    fn replay_is_deterministic() {
        let config = EmulatorConfig::default();
        let a = Emulator::trace(&counter_program(), 50, &config);
        let b = Emulator::trace(&counter_program(), 50, &config);
        assert_eq!(a, b);
    }
}
