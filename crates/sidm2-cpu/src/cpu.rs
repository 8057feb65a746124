//! NMOS 6502 interpreter.

use bitflags::bitflags;
use sidm2_common::Address;

use crate::bus::Bus;
use crate::opcodes::{AddressingMode, Mnemonic, Opcode, opcode};

/// Page holding the hardware stack.
pub const STACK_BASE: u16 = 0x0100;

/// Hardware IRQ/BRK vector.
pub const IRQ_VECTOR: u16 = 0xFFFE;

bitflags! {
    /// Processor status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        /// Carry.
        const CARRY = 0x01;
        /// Zero result.
        const ZERO = 0x02;
        /// Interrupts masked.
        const IRQ_DISABLE = 0x04;
        /// BCD arithmetic.
        const DECIMAL = 0x08;
        /// Set in pushed copies by BRK/PHP.
        const BREAK = 0x10;
        /// Always reads as 1.
        const UNUSED = 0x20;
        /// Signed overflow.
        const OVERFLOW = 0x40;
        /// Negative result.
        const NEGATIVE = 0x80;
    }
}

/// Programmer-visible register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Accumulator.
    pub a: u8,
    /// X index.
    pub x: u8,
    /// Y index.
    pub y: u8,
    /// Stack pointer (offset into page 1).
    pub sp: u8,
    /// Program counter.
    pub pc: u16,
    /// Status flags.
    pub status: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFF,
            pc: 0,
            status: Status::UNUSED | Status::IRQ_DISABLE,
        }
    }
}

impl Registers {
    #[inline]
    fn set_nz(&mut self, value: u8) {
        self.status.set(Status::ZERO, value == 0);
        self.status.set(Status::NEGATIVE, value & 0x80 != 0);
    }

    #[inline]
    fn carry(&self) -> u8 {
        self.status.contains(Status::CARRY) as u8
    }

    fn restore_status(&mut self, pulled: u8) {
        self.status = (Status::from_bits_retain(pulled) - Status::BREAK) | Status::UNUSED;
    }
}

/// An undocumented opcode was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalOpcode {
    /// Opcode byte.
    pub opcode: u8,
    /// Address it was fetched from.
    pub address: Address,
}

/// Record of one executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    /// Address of the opcode byte.
    pub pc: Address,
    /// Opcode metadata (mnemonic, addressing mode).
    pub opcode: Opcode,
    /// Raw operand as encoded in the instruction.
    pub operand: u16,
    /// Resolved effective address, for modes that have one.
    pub effective: Option<Address>,
    /// Cycles consumed including penalties.
    pub cycles: u32,
}

/// The processor core. Memory lives behind a [`Bus`].
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    regs: Registers,
    cycles: u64,
}

#[inline]
fn crosses_page(a: u16, b: u16) -> bool {
    a & 0xFF00 != b & 0xFF00
}

impl Cpu {
    /// CPU in power-on state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register file.
    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    /// Mutable register file.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Cycles executed since creation.
    pub fn total_cycles(&self) -> u64 {
        self.cycles
    }

    /// Push a byte onto the hardware stack.
    pub fn push<B: Bus>(&mut self, bus: &mut B, value: u8) {
        bus.write(STACK_BASE | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    /// Pull a byte from the hardware stack.
    pub fn pull<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        bus.read(STACK_BASE | self.regs.sp as u16)
    }

    fn push_word<B: Bus>(&mut self, bus: &mut B, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pull_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.pull(bus);
        let hi = self.pull(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// Push PC and status the way the hardware does on an interrupt and
    /// continue at `entry`.
    pub fn interrupt<B: Bus>(&mut self, bus: &mut B, return_to: u16, entry: u16) {
        self.push_word(bus, return_to);
        let pushed = (self.regs.status - Status::BREAK) | Status::UNUSED;
        self.push(bus, pushed.bits());
        self.regs.status.insert(Status::IRQ_DISABLE);
        self.regs.pc = entry;
    }

    /// Fetch, decode and execute one instruction.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<Executed, IllegalOpcode> {
        let pc = self.regs.pc;
        let byte = bus.read(pc);
        let op = opcode(byte).ok_or(IllegalOpcode {
            opcode: byte,
            address: Address(pc),
        })?;
        let operand = match op.mode.operand_len() {
            0 => 0,
            1 => bus.read(pc.wrapping_add(1)) as u16,
            _ => u16::from_le_bytes([bus.read(pc.wrapping_add(1)), bus.read(pc.wrapping_add(2))]),
        };
        self.regs.pc = pc.wrapping_add(op.len() as u16);

        let (effective, crossed) = self.effective_address(bus, op.mode, operand);
        let mut cycles = op.cycles as u32;
        if op.page_penalty && crossed {
            cycles += 1;
        }
        cycles += self.execute(bus, op, operand, effective.unwrap_or(0));
        self.cycles += cycles as u64;

        Ok(Executed {
            pc: Address(pc),
            opcode: op,
            operand,
            effective: effective.map(Address),
            cycles,
        })
    }

    fn zero_page_word<B: Bus>(bus: &mut B, zp: u8) -> u16 {
        u16::from_le_bytes([bus.read(zp as u16), bus.read(zp.wrapping_add(1) as u16)])
    }

    fn effective_address<B: Bus>(
        &self,
        bus: &mut B,
        mode: AddressingMode,
        operand: u16,
    ) -> (Option<u16>, bool) {
        let r = &self.regs;
        match mode {
            AddressingMode::Implied | AddressingMode::Accumulator | AddressingMode::Immediate => {
                (None, false)
            }
            AddressingMode::ZeroPage => (Some(operand & 0xFF), false),
            AddressingMode::ZeroPageX => (Some((operand as u8).wrapping_add(r.x) as u16), false),
            AddressingMode::ZeroPageY => (Some((operand as u8).wrapping_add(r.y) as u16), false),
            AddressingMode::Absolute => (Some(operand), false),
            AddressingMode::AbsoluteX => {
                let ea = operand.wrapping_add(r.x as u16);
                (Some(ea), crosses_page(operand, ea))
            }
            AddressingMode::AbsoluteY => {
                let ea = operand.wrapping_add(r.y as u16);
                (Some(ea), crosses_page(operand, ea))
            }
            AddressingMode::Indirect => {
                // The high byte is fetched without carrying into the page.
                let lo = bus.read(operand);
                let hi = bus.read((operand & 0xFF00) | (operand.wrapping_add(1) & 0x00FF));
                (Some(u16::from_le_bytes([lo, hi])), false)
            }
            AddressingMode::IndexedIndirect => {
                let zp = (operand as u8).wrapping_add(r.x);
                (Some(Self::zero_page_word(bus, zp)), false)
            }
            AddressingMode::IndirectIndexed => {
                let base = Self::zero_page_word(bus, operand as u8);
                let ea = base.wrapping_add(r.y as u16);
                (Some(ea), crosses_page(base, ea))
            }
            AddressingMode::Relative => {
                let offset = operand as u8 as i8 as i16 as u16;
                (Some(r.pc.wrapping_add(offset)), false)
            }
        }
    }

    fn load<B: Bus>(&self, bus: &mut B, mode: AddressingMode, operand: u16, addr: u16) -> u8 {
        match mode {
            AddressingMode::Immediate => operand as u8,
            AddressingMode::Accumulator => self.regs.a,
            _ => bus.read(addr),
        }
    }

    fn read_modify_write<B: Bus>(
        &mut self,
        bus: &mut B,
        mode: AddressingMode,
        addr: u16,
        f: fn(&mut Registers, u8) -> u8,
    ) {
        let value = if mode == AddressingMode::Accumulator {
            self.regs.a
        } else {
            bus.read(addr)
        };
        let result = f(&mut self.regs, value);
        self.regs.set_nz(result);
        if mode == AddressingMode::Accumulator {
            self.regs.a = result;
        } else {
            bus.write(addr, result);
        }
    }

    fn branch(&mut self, taken: bool, target: u16) -> u32 {
        if !taken {
            return 0;
        }
        let extra = if crosses_page(self.regs.pc, target) { 2 } else { 1 };
        self.regs.pc = target;
        extra
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.regs.status.set(Status::CARRY, register >= value);
        self.regs.set_nz(register.wrapping_sub(value));
    }

    fn adc(&mut self, m: u8) {
        let a = self.regs.a as u16;
        let m = m as u16;
        let c = self.regs.carry() as u16;
        let binary = a + m + c;
        let status = &mut self.regs.status;

        if status.contains(Status::DECIMAL) {
            let mut lo = (a & 0x0F) + (m & 0x0F) + c;
            let mut hi = (a >> 4) + (m >> 4);
            if lo > 9 {
                lo += 6;
            }
            if lo > 0x0F {
                hi += 1;
            }
            status.set(Status::ZERO, binary & 0xFF == 0);
            status.set(Status::NEGATIVE, (hi << 4) & 0x80 != 0);
            status.set(Status::OVERFLOW, !(a ^ m) & (a ^ (hi << 4)) & 0x80 != 0);
            if hi > 9 {
                hi += 6;
            }
            status.set(Status::CARRY, hi > 0x0F);
            self.regs.a = (((hi << 4) | (lo & 0x0F)) & 0xFF) as u8;
        } else {
            status.set(Status::OVERFLOW, !(a ^ m) & (a ^ binary) & 0x80 != 0);
            status.set(Status::CARRY, binary > 0xFF);
            self.regs.a = binary as u8;
            self.regs.set_nz(self.regs.a);
        }
    }

    fn sbc(&mut self, m: u8) {
        let a = self.regs.a as i16;
        let m = m as i16;
        let borrow = 1 - self.regs.carry() as i16;
        let binary = a - m - borrow;

        self.regs
            .status
            .set(Status::OVERFLOW, (a ^ m) & (a ^ binary) & 0x80 != 0);
        self.regs.status.set(Status::CARRY, binary >= 0);
        self.regs.set_nz(binary as u8);

        if self.regs.status.contains(Status::DECIMAL) {
            let mut lo = (a & 0x0F) - (m & 0x0F) - borrow;
            let mut hi = (a >> 4) - (m >> 4);
            if lo < 0 {
                lo -= 6;
                hi -= 1;
            }
            if hi < 0 {
                hi -= 6;
            }
            self.regs.a = (((hi << 4) | (lo & 0x0F)) & 0xFF) as u8;
        } else {
            self.regs.a = binary as u8;
        }
    }

    /// Execute a decoded instruction. Returns extra cycles (branches).
    fn execute<B: Bus>(&mut self, bus: &mut B, op: Opcode, operand: u16, addr: u16) -> u32 {
        use Mnemonic::*;
        let mode = op.mode;
        match op.mnemonic {
            Adc => {
                let m = self.load(bus, mode, operand, addr);
                self.adc(m);
            }
            Sbc => {
                let m = self.load(bus, mode, operand, addr);
                self.sbc(m);
            }
            And => {
                let m = self.load(bus, mode, operand, addr);
                self.regs.a &= m;
                self.regs.set_nz(self.regs.a);
            }
            Ora => {
                let m = self.load(bus, mode, operand, addr);
                self.regs.a |= m;
                self.regs.set_nz(self.regs.a);
            }
            Eor => {
                let m = self.load(bus, mode, operand, addr);
                self.regs.a ^= m;
                self.regs.set_nz(self.regs.a);
            }
            Asl => self.read_modify_write(bus, mode, addr, |r, v| {
                r.status.set(Status::CARRY, v & 0x80 != 0);
                v << 1
            }),
            Lsr => self.read_modify_write(bus, mode, addr, |r, v| {
                r.status.set(Status::CARRY, v & 0x01 != 0);
                v >> 1
            }),
            Rol => self.read_modify_write(bus, mode, addr, |r, v| {
                let carry_in = r.carry();
                r.status.set(Status::CARRY, v & 0x80 != 0);
                (v << 1) | carry_in
            }),
            Ror => self.read_modify_write(bus, mode, addr, |r, v| {
                let carry_in = r.carry() << 7;
                r.status.set(Status::CARRY, v & 0x01 != 0);
                (v >> 1) | carry_in
            }),
            Inc => self.read_modify_write(bus, mode, addr, |_, v| v.wrapping_add(1)),
            Dec => self.read_modify_write(bus, mode, addr, |_, v| v.wrapping_sub(1)),
            Bit => {
                let m = bus.read(addr);
                let status = &mut self.regs.status;
                status.set(Status::ZERO, self.regs.a & m == 0);
                status.set(Status::OVERFLOW, m & 0x40 != 0);
                status.set(Status::NEGATIVE, m & 0x80 != 0);
            }
            Cmp => {
                let m = self.load(bus, mode, operand, addr);
                self.compare(self.regs.a, m);
            }
            Cpx => {
                let m = self.load(bus, mode, operand, addr);
                self.compare(self.regs.x, m);
            }
            Cpy => {
                let m = self.load(bus, mode, operand, addr);
                self.compare(self.regs.y, m);
            }
            Lda => {
                self.regs.a = self.load(bus, mode, operand, addr);
                self.regs.set_nz(self.regs.a);
            }
            Ldx => {
                self.regs.x = self.load(bus, mode, operand, addr);
                self.regs.set_nz(self.regs.x);
            }
            Ldy => {
                self.regs.y = self.load(bus, mode, operand, addr);
                self.regs.set_nz(self.regs.y);
            }
            Sta => bus.write(addr, self.regs.a),
            Stx => bus.write(addr, self.regs.x),
            Sty => bus.write(addr, self.regs.y),

            Bcc => return self.branch(!self.regs.status.contains(Status::CARRY), addr),
            Bcs => return self.branch(self.regs.status.contains(Status::CARRY), addr),
            Bne => return self.branch(!self.regs.status.contains(Status::ZERO), addr),
            Beq => return self.branch(self.regs.status.contains(Status::ZERO), addr),
            Bpl => return self.branch(!self.regs.status.contains(Status::NEGATIVE), addr),
            Bmi => return self.branch(self.regs.status.contains(Status::NEGATIVE), addr),
            Bvc => return self.branch(!self.regs.status.contains(Status::OVERFLOW), addr),
            Bvs => return self.branch(self.regs.status.contains(Status::OVERFLOW), addr),

            Jmp => self.regs.pc = addr,
            Jsr => {
                let ret = self.regs.pc.wrapping_sub(1);
                self.push_word(bus, ret);
                self.regs.pc = addr;
            }
            Rts => self.regs.pc = self.pull_word(bus).wrapping_add(1),
            Rti => {
                let pulled = self.pull(bus);
                self.regs.restore_status(pulled);
                self.regs.pc = self.pull_word(bus);
            }
            Brk => {
                let ret = self.regs.pc.wrapping_add(1);
                self.push_word(bus, ret);
                let pushed = self.regs.status | Status::BREAK | Status::UNUSED;
                self.push(bus, pushed.bits());
                self.regs.status.insert(Status::IRQ_DISABLE);
                self.regs.pc =
                    u16::from_le_bytes([bus.read(IRQ_VECTOR), bus.read(IRQ_VECTOR + 1)]);
            }

            Pha => self.push(bus, self.regs.a),
            Php => {
                let pushed = self.regs.status | Status::BREAK | Status::UNUSED;
                self.push(bus, pushed.bits());
            }
            Pla => {
                self.regs.a = self.pull(bus);
                self.regs.set_nz(self.regs.a);
            }
            Plp => {
                let pulled = self.pull(bus);
                self.regs.restore_status(pulled);
            }

            Clc => self.regs.status.remove(Status::CARRY),
            Cld => self.regs.status.remove(Status::DECIMAL),
            Cli => self.regs.status.remove(Status::IRQ_DISABLE),
            Clv => self.regs.status.remove(Status::OVERFLOW),
            Sec => self.regs.status.insert(Status::CARRY),
            Sed => self.regs.status.insert(Status::DECIMAL),
            Sei => self.regs.status.insert(Status::IRQ_DISABLE),

            Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.regs.set_nz(self.regs.x);
            }
            Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.regs.set_nz(self.regs.y);
            }
            Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.regs.set_nz(self.regs.x);
            }
            Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.regs.set_nz(self.regs.y);
            }
            Tax => {
                self.regs.x = self.regs.a;
                self.regs.set_nz(self.regs.x);
            }
            Tay => {
                self.regs.y = self.regs.a;
                self.regs.set_nz(self.regs.y);
            }
            Tsx => {
                self.regs.x = self.regs.sp;
                self.regs.set_nz(self.regs.x);
            }
            Txa => {
                self.regs.a = self.regs.x;
                self.regs.set_nz(self.regs.a);
            }
            Txs => self.regs.sp = self.regs.x,
            Tya => {
                self.regs.a = self.regs.y;
                self.regs.set_nz(self.regs.a);
            }
            Nop => {}
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ram(Vec<u8>);

    impl Bus for Ram {
        fn read(&mut self, addr: u16) -> u8 {
            self.0[addr as usize]
        }
        fn write(&mut self, addr: u16, value: u8) {
            self.0[addr as usize] = value;
        }
    }

    fn machine(program: &[u8]) -> (Cpu, Ram) {
        let mut ram = Ram(vec![0; 0x1_0000]);
        ram.0[0x0200..0x0200 + program.len()].copy_from_slice(program);
        let mut cpu = Cpu::new();
        cpu.registers_mut().pc = 0x0200;
        (cpu, ram)
    }

    fn run(cpu: &mut Cpu, ram: &mut Ram, steps: usize) {
        for _ in 0..steps {
            cpu.step(ram).unwrap();
        }
    }

    #[test]
    fn binary_add_sets_carry_and_overflow() {
        // LDA #$7F; CLC; ADC #$01
        let (mut cpu, mut ram) = machine(&[0xA9, 0x7F, 0x18, 0x69, 0x01]);
        run(&mut cpu, &mut ram, 3);
        let r = cpu.registers();
        assert_eq!(r.a, 0x80);
        assert!(r.status.contains(Status::OVERFLOW));
        assert!(r.status.contains(Status::NEGATIVE));
        assert!(!r.status.contains(Status::CARRY));
    }

    #[test]
    fn decimal_mode_arithmetic() {
        // SED; CLC; LDA #$19; ADC #$28; STA $10; SEC; LDA #$42; SBC #$13
        let (mut cpu, mut ram) = machine(&[
            0xF8, 0x18, 0xA9, 0x19, 0x69, 0x28, 0x85, 0x10, 0x38, 0xA9, 0x42, 0xE9, 0x13,
        ]);
        run(&mut cpu, &mut ram, 5);
        assert_eq!(ram.0[0x10], 0x47);
        run(&mut cpu, &mut ram, 3);
        assert_eq!(cpu.registers().a, 0x29);
        assert!(cpu.registers().status.contains(Status::CARRY));
    }

    #[test]
    fn indirect_jump_wraps_within_page() {
        // JMP ($02FF)
        let (mut cpu, mut ram) = machine(&[0x6C, 0xFF, 0x02]);
        ram.0[0x02FF] = 0x34;
        ram.0[0x0200] = 0x6C; // high byte comes from $0200, not $0300
        ram.0[0x0300] = 0x99;
        run(&mut cpu, &mut ram, 1);
        assert_eq!(cpu.registers().pc, 0x6C34);
    }

    #[test]
    fn subroutine_call_and_return() {
        // JSR $0210; BRK ... $0210: LDX #$05; RTS
        let (mut cpu, mut ram) = machine(&[0x20, 0x10, 0x02]);
        ram.0[0x0210..0x0213].copy_from_slice(&[0xA2, 0x05, 0x60]);
        run(&mut cpu, &mut ram, 3);
        assert_eq!(cpu.registers().pc, 0x0203);
        assert_eq!(cpu.registers().x, 5);
        assert_eq!(cpu.registers().sp, 0xFF);
    }

    #[test]
    fn branch_and_page_cross_penalties() {
        // LDX #$01; LDA $02FF,X (crosses); BNE +0 (taken, same page)
        let (mut cpu, mut ram) = machine(&[0xA2, 0x01, 0xBD, 0xFF, 0x02, 0xD0, 0x00]);
        ram.0[0x0300] = 0x11;
        cpu.step(&mut ram).unwrap();
        let load = cpu.step(&mut ram).unwrap();
        assert_eq!(load.cycles, 5);
        assert_eq!(load.effective, Some(Address(0x0300)));
        let branch = cpu.step(&mut ram).unwrap();
        assert_eq!(branch.cycles, 3);
    }

    #[test]
    fn undocumented_opcode_is_reported() {
        let (mut cpu, mut ram) = machine(&[0x02]);
        let err = cpu.step(&mut ram).unwrap_err();
        assert_eq!(err.opcode, 0x02);
        assert_eq!(err.address, Address(0x0200));
    }

    #[test]
    fn stack_round_trips_status() {
        // SEC; SED; PHP; CLC; CLD; PLP
        let (mut cpu, mut ram) = machine(&[0x38, 0xF8, 0x08, 0x18, 0xD8, 0x28]);
        run(&mut cpu, &mut ram, 6);
        let status = cpu.registers().status;
        assert!(status.contains(Status::CARRY | Status::DECIMAL));
        assert!(!status.contains(Status::BREAK));
    }
}
