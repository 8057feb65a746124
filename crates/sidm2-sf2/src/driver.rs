//! Driver templates.
//!
//! The table drivers are assembled in-process: the assembler records a
//! relocation for every reference the code makes to its own tables, so a
//! template built once at [`TEMPLATE_BASE`] can be packed at any load
//! address. The wrapper used for foreign players is a jump table plus the
//! same header and metadata blocks.

use sidm2_common::sid::pal_frequency_table;
use sidm2_common::{Address, MemoryImage};
use sidm2_cpu::Mnemonic::*;
use sidm2_cpu::asm::{fixed, label};
use sidm2_cpu::{Assembler, Relocation, Target};

use crate::error::{PackError, Result};
use crate::layout::{
    Block, CODE, CODE_CAPACITY, DriverLayout, FORMAT_VERSION, HEADER, HeaderFlags, MAGIC,
    METADATA, ORDERLIST_CAPACITY, TABLE_POINTER_ORDER, TargetDriver, header,
};
use crate::model::{FILTER_ROWS, INSTRUMENT_SLOTS, MAX_SEQUENCES, PULSE_ROWS, ParameterKind};

/// Address the table driver templates are assembled for.
pub const TEMPLATE_BASE: Address = Address(0x1000);

// zero page used by the driver
const ZP_KIND: u8 = 0xF7;
const ZP_VALUE: u8 = 0xF8;
const ZP_TMP: u8 = 0xF9;
const ZP_TMP2: u8 = 0xFA;
const ZP_SEQUENCE: u8 = 0xFB;
const ZP_ORDER: u8 = 0xFD;

const SEQ_GATE_ON: u8 = 0x7D;
const SEQ_GATE_OFF: u8 = 0x7E;
const SEQ_HOLD: u8 = 0x7F;
const SEQ_PARAMETER: u8 = 0xA0;
const SEQ_END: u8 = 0xFF;
const ORDER_LOOP: u8 = 0xFF;
const TRANSPOSE_BIAS: u8 = 0xA0;

/// Sequence byte values.
pub mod bytes {
    /// Explicit gate on.
    pub const GATE_ON: u8 = super::SEQ_GATE_ON;
    /// Explicit gate off.
    pub const GATE_OFF: u8 = super::SEQ_GATE_OFF;
    /// Timed continuation.
    pub const HOLD: u8 = super::SEQ_HOLD;
    /// Set-parameter prefix, or'ed with the kind; the value follows.
    pub const PARAMETER: u8 = super::SEQ_PARAMETER;
    /// End of sequence.
    pub const END: u8 = super::SEQ_END;
    /// Orderlist loop marker.
    pub const ORDER_LOOP: u8 = super::ORDER_LOOP;
    /// Added to a transpose to form an orderlist marker.
    pub const TRANSPOSE_BIAS: u8 = super::TRANSPOSE_BIAS;
}

/// Per-voice variables, three bytes each, in block order.
const VOICE_VARS: [&str; 12] = [
    "ol_pos", "seq_lo", "seq_hi", "seq_pos", "transpose", "count", "note", "gate", "wavepos",
    "arp_step", "pulse_val", "ctrl",
];
const PARAMS_OFFSET: usize = VOICE_VARS.len() * 3;
const TICK_OFFSET: usize = PARAMS_OFFSET + ParameterKind::ALL.len() * 3;

fn param(kind: ParameterKind) -> Target {
    Target::Label("params", u16::from(kind.code()) * 3)
}

fn column(block: &'static str, column: usize, rows: usize) -> Target {
    Target::Label(block, (column * rows) as u16)
}

/// An assembled table driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverTemplate {
    /// Driver variant.
    pub driver: TargetDriver,
    /// Block layout.
    pub layout: DriverLayout,
    /// Code, header and empty table blocks at [`TEMPLATE_BASE`].
    pub image: MemoryImage,
    /// Sites referring into the template.
    pub relocations: Vec<Relocation>,
}

impl DriverTemplate {
    /// Assemble the template for a table driver.
    pub fn assemble(driver: TargetDriver) -> Result<Self> {
        let layout = driver.layout().ok_or(PackError::NoTemplate { driver })?;
        let mut a = Assembler::new(TEMPLATE_BASE);

        define_blocks(&mut a, &layout);
        a.jmp("init").jmp("play");
        emit_header(
            &mut a,
            driver,
            HeaderFlags::empty(),
            TABLE_POINTER_ORDER.map(|block| label(block_label(block))),
        );
        a.pad_to(CODE);
        emit_engine(&mut a);
        if a.here() > CODE + CODE_CAPACITY {
            return Err(PackError::CapacityExceeded {
                block: "driver code",
                needed: a.here() - CODE,
                capacity: CODE_CAPACITY,
            });
        }

        a.pad_to(layout.frequencies);
        let freq = pal_frequency_table();
        a.bytes(&freq.map(|f| f as u8));
        a.bytes(&freq.map(|f| (f >> 8) as u8));
        a.pad_to(layout.template_len());

        let assembled = a.finish()?;
        tracing::debug!(
            %driver,
            code = assembled.labels.get("engine_end").map_or(0, |end| end - CODE),
            relocations = assembled.relocations.len(),
            "assembled driver template"
        );
        Ok(Self {
            driver,
            layout,
            image: MemoryImage::new(assembled.base, assembled.bytes),
            relocations: assembled.relocations,
        })
    }

    /// Bytes a relocation may point into: the template plus its sequence
    /// data block.
    pub fn extent(&self) -> usize {
        self.layout.template_len() + DriverLayout::capacity(Block::Sequences)
    }
}

fn block_label(block: Block) -> &'static str {
    match block {
        Block::Variables => "vars",
        Block::Frequencies => "freq",
        Block::Orderlists => "orderlists",
        Block::SequencePointers => "seq_ptr_lo",
        Block::Instruments => "instruments",
        Block::Wave => "wave",
        Block::Pulse => "pulse",
        Block::Filter => "filter",
        Block::Sequences => "sequences",
    }
}

fn define_blocks(a: &mut Assembler, layout: &DriverLayout) {
    for block in [
        Block::Variables,
        Block::Frequencies,
        Block::Orderlists,
        Block::SequencePointers,
        Block::Instruments,
        Block::Wave,
        Block::Pulse,
        Block::Filter,
        Block::Sequences,
    ] {
        a.define(block_label(block), layout.offset(block));
    }
    a.define("seq_ptr_hi", layout.sequence_pointers + MAX_SEQUENCES);
    for (i, name) in VOICE_VARS.iter().enumerate() {
        a.define(name, layout.variables + i * 3);
    }
    a.define("params", layout.variables + PARAMS_OFFSET);
    a.define("tick", layout.variables + TICK_OFFSET);
    a.define("speed", header::SPEED);
}

/// Header and empty metadata block.
fn emit_header(a: &mut Assembler, driver: TargetDriver, flags: HeaderFlags, pointers: [Target; 8]) {
    debug_assert_eq!(a.here(), HEADER);
    a.bytes(&MAGIC)
        .bytes(&[driver.id(), FORMAT_VERSION, flags.bits(), 0, 0, 0]);
    for pointer in pointers {
        a.word(pointer);
    }
    a.pad_to(METADATA).pad_to(CODE);
}

fn emit_engine(a: &mut Assembler) {
    let instrument = |col| column("instruments", col, INSTRUMENT_SLOTS);

    a.label("init")
        .imm(Lda, 0)
        .imm(Ldy, (crate::layout::VARIABLES_LEN - 1) as u8)
        .label("init_clear")
        .absy(Sta, label("vars"))
        .implied(Dey)
        .branch(Bpl, "init_clear")
        .imm(Ldx, 2)
        .label("init_voice")
        .jsr("load_pattern")
        .imm(Lda, 1)
        .absx(Sta, label("count"))
        .implied(Dex)
        .branch(Bpl, "init_voice")
        .imm(Lda, 0x0F)
        .abs(Sta, fixed(0xD418))
        .imm(Lda, 1)
        .abs(Sta, label("tick"))
        .implied(Rts);

    a.label("play")
        .abs(Dec, label("tick"))
        .branch(Bne, "play_fx")
        .abs(Lda, label("speed"))
        .abs(Sta, label("tick"))
        .imm(Ldx, 2)
        .label("play_voice")
        .absx(Dec, label("count"))
        .branch(Bne, "play_next")
        .jsr("fetch")
        .label("play_next")
        .implied(Dex)
        .branch(Bpl, "play_voice")
        .label("play_fx")
        .imm(Ldx, 2)
        .label("play_fx_voice")
        .jsr("voice_fx")
        .implied(Dex)
        .branch(Bpl, "play_fx_voice")
        .implied(Rts);

    // X = voice; points ZP_ORDER at the voice's orderlist and loads the
    // next sequence, applying transpose markers on the way.
    a.label("load_pattern")
        .absx(Lda, label("order_base"))
        .implied(Clc)
        .imm_lo(Adc, "orderlists")
        .zp(Sta, ZP_ORDER)
        .imm_hi(Lda, "orderlists")
        .imm(Adc, 0)
        .zp(Sta, ZP_ORDER + 1)
        .absx(Ldy, label("ol_pos"))
        .label("lp_read")
        .indy(Lda, ZP_ORDER)
        .imm(Cmp, ORDER_LOOP)
        .branch(Bne, "lp_entry")
        .imm(Ldy, 0)
        .implied(Tya)
        .absx(Sta, label("transpose"))
        .jmp("lp_read")
        .label("lp_entry")
        .implied(Iny)
        .imm(Cmp, 0x80)
        .branch(Bcc, "lp_sequence")
        .implied(Sec)
        .imm(Sbc, TRANSPOSE_BIAS)
        .absx(Sta, label("transpose"))
        .jmp("lp_read")
        .label("lp_sequence")
        .implied(Pha)
        .implied(Tya)
        .absx(Sta, label("ol_pos"))
        .implied(Pla)
        .implied(Tay)
        .absy(Lda, label("seq_ptr_lo"))
        .absx(Sta, label("seq_lo"))
        .absy(Lda, label("seq_ptr_hi"))
        .absx(Sta, label("seq_hi"))
        .imm(Lda, 0)
        .absx(Sta, label("seq_pos"))
        .implied(Rts);

    a.label("fetch")
        .absx(Lda, label("seq_lo"))
        .zp(Sta, ZP_SEQUENCE)
        .absx(Lda, label("seq_hi"))
        .zp(Sta, ZP_SEQUENCE + 1)
        .absx(Ldy, label("seq_pos"))
        .label("f_loop")
        .indy(Lda, ZP_SEQUENCE)
        .implied(Iny)
        .implied(Pha)
        .implied(Tya)
        .absx(Sta, label("seq_pos"))
        .implied(Pla)
        .imm(Cmp, SEQ_END)
        .branch(Bne, "f_not_end")
        .jsr("load_pattern")
        .jmp("fetch")
        .label("f_not_end")
        .imm(Cmp, 0x60)
        .branch(Bcs, "f_not_note")
        .implied(Clc)
        .absx(Adc, label("transpose"))
        .absx(Sta, label("note"))
        .jsr("start_note")
        .jmp("f_timed")
        .label("f_not_note")
        .imm(Cmp, SEQ_HOLD)
        .branch(Beq, "f_timed")
        .imm(Cmp, SEQ_GATE_ON)
        .branch(Bne, "f_not_on")
        .imm(Lda, 1)
        .absx(Sta, label("gate"))
        .jmp("f_next")
        .label("f_not_on")
        .imm(Cmp, SEQ_GATE_OFF)
        .branch(Bne, "f_not_off")
        .imm(Lda, 0)
        .absx(Sta, label("gate"))
        .jsr("gate_off")
        .jmp("f_next")
        .label("f_not_off")
        .imm(Cmp, SEQ_PARAMETER)
        .branch(Bcc, "f_next")
        .imm(Cmp, SEQ_PARAMETER + ParameterKind::ALL.len() as u8)
        .branch(Bcs, "f_next")
        .imm(And, 0x0F)
        .zp(Sta, ZP_KIND)
        .indy(Lda, ZP_SEQUENCE)
        .implied(Iny)
        .zp(Sta, ZP_VALUE)
        .implied(Tya)
        .absx(Sta, label("seq_pos"))
        .jsr("set_param")
        .label("f_next")
        .absx(Ldy, label("seq_pos"))
        .jmp("f_loop")
        .label("f_timed")
        .absx(Lda, param(ParameterKind::Duration))
        .implied(Clc)
        .imm(Adc, 1)
        .absx(Sta, label("count"))
        .implied(Rts);

    // ZP_KIND = kind, ZP_VALUE = value
    a.label("set_param")
        .zp(Lda, ZP_KIND)
        .acc(Asl)
        .implied(Clc)
        .zp(Adc, ZP_KIND)
        .zp(Sta, ZP_TMP)
        .implied(Txa)
        .implied(Clc)
        .zp(Adc, ZP_TMP)
        .implied(Tay)
        .zp(Lda, ZP_VALUE)
        .absy(Sta, label("params"))
        .zp(Lda, ZP_KIND)
        .imm(Cmp, ParameterKind::Attack.code())
        .branch(Bcc, "sp_filter")
        .absx(Lda, param(ParameterKind::Attack))
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .zp(Sta, ZP_TMP)
        .absx(Lda, param(ParameterKind::Decay))
        .imm(And, 0x0F)
        .zp(Ora, ZP_TMP)
        .absx(Ldy, label("voice_offset"))
        .absy(Sta, fixed(0xD405))
        .implied(Rts)
        .label("sp_filter")
        .imm(Cmp, ParameterKind::FilterCutoff.code())
        .branch(Bne, "sp_resonance")
        .zp(Lda, ZP_VALUE)
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .abs(Sta, fixed(0xD416))
        .implied(Rts)
        .label("sp_resonance")
        .imm(Cmp, ParameterKind::FilterResonance.code())
        .branch(Bne, "sp_done")
        .zp(Lda, ZP_VALUE)
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .imm(Ora, 0x07)
        .abs(Sta, fixed(0xD417))
        .label("sp_done")
        .implied(Rts);

    a.label("start_note")
        .absx(Lda, param(ParameterKind::Instrument))
        .imm(And, (INSTRUMENT_SLOTS - 1) as u8)
        .implied(Tay)
        .absy(Lda, instrument(5))
        .absx(Sta, label("wavepos"))
        .absy(Lda, instrument(4))
        .zp(Sta, ZP_TMP)
        .absy(Lda, instrument(3))
        .zp(Sta, ZP_TMP2)
        .absy(Lda, instrument(1))
        .implied(Pha)
        .absy(Lda, instrument(0))
        .absx(Ldy, label("voice_offset"))
        .absy(Sta, fixed(0xD405))
        .implied(Pla)
        .absy(Sta, fixed(0xD406))
        .zp(Lda, ZP_TMP)
        .imm(And, (PULSE_ROWS - 1) as u8)
        .implied(Tay)
        .absy(Lda, label("pulse"))
        .absx(Sta, label("pulse_val"))
        .imm(Lda, 0)
        .absx(Sta, label("arp_step"))
        .zp(Lda, ZP_TMP2)
        .imm(And, (FILTER_ROWS - 1) as u8)
        .branch(Beq, "sn_done")
        .implied(Tay)
        .absy(Lda, column("filter", 0, FILTER_ROWS))
        .abs(Sta, fixed(0xD416))
        .absy(Lda, column("filter", 1, FILTER_ROWS))
        .abs(Sta, fixed(0xD417))
        .absy(Lda, column("filter", 2, FILTER_ROWS))
        .abs(Sta, fixed(0xD418))
        .label("sn_done")
        .implied(Rts);

    a.label("gate_off")
        .absx(Lda, label("ctrl"))
        .imm(And, 0xFE)
        .absx(Sta, label("ctrl"))
        .absx(Ldy, label("voice_offset"))
        .absy(Sta, fixed(0xD404))
        .implied(Rts);

    // per frame: pulse sweep, wave step, arpeggio, frequency, control
    a.label("voice_fx")
        .absx(Lda, label("pulse_val"))
        .implied(Clc)
        .absx(Adc, param(ParameterKind::PulseSpeed))
        .absx(Sta, label("pulse_val"))
        .absx(Ldy, label("voice_offset"))
        .implied(Pha)
        .acc(Lsr)
        .acc(Lsr)
        .acc(Lsr)
        .acc(Lsr)
        .absy(Sta, fixed(0xD403))
        .implied(Pla)
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .acc(Asl)
        .absy(Sta, fixed(0xD402))
        .absx(Lda, label("wavepos"))
        .acc(Asl)
        .implied(Tay)
        .absy(Lda, label("wave"))
        .imm(Cmp, sidm2_laxity::WAVE_JUMP)
        .branch(Bne, "vf_play")
        .absy(Lda, Target::Label("wave", 1))
        .absx(Sta, label("wavepos"))
        .acc(Asl)
        .implied(Tay)
        .absy(Lda, label("wave"))
        .label("vf_play")
        .zp(Sta, ZP_TMP)
        .absy(Lda, Target::Label("wave", 1))
        .zp(Sta, ZP_TMP2)
        .absx(Inc, label("wavepos"))
        .imm(Lda, 0)
        .zp(Sta, ZP_KIND)
        .absx(Ldy, label("arp_step"))
        .branch(Beq, "vf_arp_next")
        .absx(Lda, param(ParameterKind::ArpeggioFirst))
        .implied(Dey)
        .branch(Beq, "vf_arp_set")
        .absx(Lda, param(ParameterKind::ArpeggioSecond))
        .label("vf_arp_set")
        .zp(Sta, ZP_KIND)
        .label("vf_arp_next")
        .absx(Inc, label("arp_step"))
        .absx(Lda, label("arp_step"))
        .imm(Cmp, 3)
        .branch(Bcc, "vf_note")
        .imm(Lda, 0)
        .absx(Sta, label("arp_step"))
        .label("vf_note")
        .zp(Lda, ZP_TMP2)
        .branch(Bmi, "vf_absolute")
        .implied(Clc)
        .absx(Adc, label("note"))
        .implied(Clc)
        .zp(Adc, ZP_KIND)
        .jmp("vf_clamp")
        .label("vf_absolute")
        .imm(And, 0x7F)
        .label("vf_clamp")
        .imm(Cmp, sidm2_common::sid::NOTE_COUNT as u8)
        .branch(Bcc, "vf_freq")
        .imm(Lda, sidm2_common::sid::NOTE_COUNT as u8 - 1)
        .label("vf_freq")
        .implied(Tay)
        .absy(Lda, label("freq"))
        .zp(Sta, ZP_KIND)
        .absy(Lda, Target::Label("freq", sidm2_common::sid::NOTE_COUNT as u16))
        .zp(Sta, ZP_VALUE)
        .absx(Ldy, label("voice_offset"))
        .zp(Lda, ZP_KIND)
        .absy(Sta, fixed(0xD400))
        .zp(Lda, ZP_VALUE)
        .absy(Sta, fixed(0xD401))
        .zp(Lda, ZP_TMP)
        .imm(And, 0xFE)
        .absx(Ora, label("gate"))
        .absx(Sta, label("ctrl"))
        .absy(Sta, fixed(0xD404))
        .implied(Rts);

    a.label("voice_offset").bytes(&[0, 7, 14]);
    a.label("order_base")
        .bytes(&[0, ORDERLIST_CAPACITY as u8, 2 * ORDERLIST_CAPACITY as u8]);
    a.label("engine_end");
}

/// 128 byte wrapper placed in front of a foreign player: `JMP init`,
/// `JMP play` (or `RTS` when `play` is `None`), header and an empty
/// metadata block. Nothing in it is relocatable.
pub fn assemble_wrapper(
    base: Address,
    driver: TargetDriver,
    init: Address,
    play: Option<Address>,
    speed: u8,
) -> Result<Vec<u8>> {
    let mut flags = HeaderFlags::WRAPPED;
    let mut a = Assembler::new(base);
    a.abs(Jmp, fixed(init.get()));
    match play {
        Some(play) => {
            a.abs(Jmp, fixed(play.get()));
        }
        None => {
            flags |= HeaderFlags::IRQ_DRIVEN;
            a.implied(Rts).implied(Nop).implied(Nop);
        }
    }
    let mut pointers = [fixed(0); 8];
    pointers[0] = fixed(base.wrapping_add(CODE as u16).get());
    emit_header(&mut a, driver, flags, pointers);
    let mut bytes = a.finish()?.bytes;
    bytes[header::SPEED] = speed;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidm2_cpu::{Emulator, EmulatorConfig, RelocationKind, SidProgram};

    #[test]
    fn templates_fit_their_layout() {
        for driver in [TargetDriver::Driver11, TargetDriver::Np20] {
            let template = DriverTemplate::assemble(driver).unwrap();
            assert_eq!(template.image.len(), template.layout.template_len());
            assert_eq!(template.image.bytes()[0], 0x4C);
            assert_eq!(&template.image.bytes()[HEADER..HEADER + 2], &MAGIC);
            assert_eq!(template.image.bytes()[header::DRIVER], driver.id());
        }
    }

    #[test]
    fn laxity_aware_has_no_table_template() {
        assert_eq!(
            DriverTemplate::assemble(TargetDriver::LaxityAware).unwrap_err(),
            PackError::NoTemplate {
                driver: TargetDriver::LaxityAware
            }
        );
    }

    #[test]
    fn header_table_pointers_are_relocatable() {
        let template = DriverTemplate::assemble(TargetDriver::Np20).unwrap();
        let words: Vec<usize> = template
            .relocations
            .iter()
            .filter(|r| r.kind == RelocationKind::DataWord)
            .map(|r| r.site)
            .collect();
        assert_eq!(words.len(), 8);
        let first = header::TABLE_POINTERS;
        assert_eq!(words[0], first);
        let orderlists = template.image.read_u16_le(TEMPLATE_BASE.wrapping_add(first as u16));
        assert_eq!(orderlists, Some(0x1000 + 0x0900));
    }

    #[test]
    fn np20_code_follows_its_layout() {
        let d11 = DriverTemplate::assemble(TargetDriver::Driver11).unwrap();
        let np20 = DriverTemplate::assemble(TargetDriver::Np20).unwrap();
        assert_eq!(d11.relocations.len(), np20.relocations.len());
        assert_ne!(d11.image.bytes()[CODE..], np20.image.bytes()[CODE..]);
    }

    #[test]
    fn wrapper_is_one_header_long() {
        let bytes =
            assemble_wrapper(Address(0x0F80), TargetDriver::Driver11, Address(0x1000), None, 1)
                .unwrap();
        assert_eq!(bytes.len(), CODE);
        assert_eq!(&bytes[0..3], &[0x4C, 0x00, 0x10]);
        assert_eq!(bytes[3], 0x60);
        let flags = HeaderFlags::from_bits_truncate(bytes[header::FLAGS]);
        assert!(flags.contains(HeaderFlags::WRAPPED | HeaderFlags::IRQ_DRIVEN));
    }

    #[test]
    fn empty_template_runs_without_faulting() {
        // every orderlist is a bare loop marker in a zeroed template, so
        // give each voice a one-hold sequence first
        let template = DriverTemplate::assemble(TargetDriver::Driver11).unwrap();
        let layout = template.layout;
        let mut bytes = template.image.bytes().to_vec();
        for voice in 0..3 {
            bytes[layout.orderlists + voice * ORDERLIST_CAPACITY] = 0;
            bytes[layout.orderlists + voice * ORDERLIST_CAPACITY + 1] = ORDER_LOOP;
        }
        let seq = TEMPLATE_BASE.wrapping_add(layout.sequences as u16);
        bytes[layout.sequence_pointers] = seq.lo();
        bytes[layout.sequence_pointers + MAX_SEQUENCES] = seq.hi();
        bytes.extend_from_slice(&[SEQ_HOLD, SEQ_END]);
        bytes[header::SPEED] = 1;

        let program = SidProgram {
            image: MemoryImage::new(TEMPLATE_BASE, bytes),
            init: TEMPLATE_BASE,
            play: TEMPLATE_BASE.wrapping_add(3),
            subtune: 0,
        };
        let trace = Emulator::trace(&program, 20, &EmulatorConfig::default());
        assert_eq!(trace.fault(), None);
        assert_eq!(trace.frames_completed(), 20);
    }
}
