//! Synthetic NewPlayer v21 players.
//!
//! [`Np21Fixture`] assembles a small but complete player: it keeps its
//! tables at the standard offsets (optionally displaced), reads them
//! through absolute indexed addressing, walks orderlists and sequences
//! through zero-page pointers, sets up the command table pointer with an
//! immediate low/high pair and writes every SID voice register once per
//! frame.

use sidm2_common::sid::{NOTE_COUNT, pal_frequency_table};
use sidm2_common::{Address, MemoryImage};
use sidm2_cpu::asm::{Target, fixed, label};
use sidm2_cpu::{Assembled, Assembler, AsmError, Mnemonic::*};
use sidm2_psid::{SidHeader, write_psid};

use crate::layout::{
    COMMAND_COUNT, FILTER_ROWS, INSTRUMENT_COUNT, PULSE_ROWS, SEQUENCE_SLOTS, offsets,
};
use crate::model::{
    Command, OrderEntry, SourceEvent, SourceInstrument, TableRow, WAVE_JUMP, WaveTable,
    encode_sequence,
};

const ZP_COMMANDS: u8 = 0xF7;
const ZP_SEQUENCE: u8 = 0xFB;
const ZP_ORDER: u8 = 0xFD;

/// Per-voice player variables, three bytes each.
const VOICE_VARS: [&str; 13] = [
    "ol_lo", "ol_hi", "ol_pos", "seq_lo", "seq_hi", "seq_pos", "transpose", "count", "duration",
    "instr", "note", "gate", "wavepos",
];

/// Description of a synthetic player and its music.
#[derive(Debug, Clone)]
pub struct Np21Fixture {
    /// Load address.
    pub load: Address,
    /// Displacement of the table block.
    pub table_shift: u16,
    /// Replace `JMP init` with NOPs (init is then called directly).
    pub broken_signature: bool,
    /// Frames per tick.
    pub speed: u8,
    /// Instrument rows.
    pub instruments: [SourceInstrument; INSTRUMENT_COUNT],
    /// Wave table.
    pub wave: WaveTable,
    /// Pulse rows.
    pub pulse: [TableRow; PULSE_ROWS],
    /// Filter rows.
    pub filter: [TableRow; FILTER_ROWS],
    /// Command table.
    pub commands: [Command; COMMAND_COUNT],
    /// Orderlists.
    pub orderlists: [Vec<OrderEntry>; 3],
    /// Sequences by index.
    pub sequences: Vec<Vec<SourceEvent>>,
    /// Point one voice's orderlist pointer somewhere else.
    pub dangling_voice: Option<(usize, Address)>,
    /// Title.
    pub name: String,
    /// Composer.
    pub author: String,
}

fn entry(transpose: i8, sequence: u8) -> OrderEntry {
    OrderEntry {
        transpose,
        sequence,
    }
}

fn reference_sequences() -> Vec<Vec<SourceEvent>> {
    use SourceEvent::*;

    vec![
        vec![
            Instrument(0),
            Duration(3),
            Note(24),
            Note(28),
            Release,
            Note(31),
            Tie,
            End,
        ],
        vec![
            Instrument(1),
            Duration(1),
            Note(36),
            Command(0),
            Note(38),
            Duration(5),
            Note(40),
            Command(1),
            Note(41),
            End,
        ],
        vec![Instrument(2), Duration(7), Note(12), Release, End],
        vec![
            Duration(2),
            Instrument(0),
            Note(48),
            Command(2),
            Note(50),
            Tie,
            Release,
            End,
        ],
    ]
}

impl Np21Fixture {
    /// Three voices, four sequences, all table kinds in use.
    pub fn reference() -> Self {
        let mut instruments = [SourceInstrument::default(); INSTRUMENT_COUNT];
        instruments[0] = SourceInstrument {
            attack_decay: 0x09,
            sustain_release: 0xA0,
            wave_index: 0,
            pulse_index: 1,
            filter_index: 0,
            flags: 0x00,
            vibrato: [0x12, 0x03],
        };
        instruments[1] = SourceInstrument {
            attack_decay: 0x22,
            sustain_release: 0xF8,
            wave_index: 3,
            pulse_index: 2,
            filter_index: 1,
            flags: 0x40,
            vibrato: [0, 0],
        };
        instruments[2] = SourceInstrument {
            attack_decay: 0x00,
            sustain_release: 0xC9,
            wave_index: 6,
            pulse_index: 0,
            filter_index: 0,
            flags: 0x01,
            vibrato: [0, 0],
        };

        let mut wave = WaveTable::default();
        let rows: [(u8, u8); 9] = [
            (0x00, 0x41),
            (0x00, 0x41),
            (0x01, WAVE_JUMP),
            (0x0C, 0x21),
            (0x00, 0x21),
            (0x04, WAVE_JUMP),
            (0xB0, 0x81),
            (0x00, 0x11),
            (0x07, WAVE_JUMP),
        ];
        for (i, (offset, waveform)) in rows.into_iter().enumerate() {
            wave.note_offsets[i] = offset;
            wave.waveforms[i] = waveform;
        }

        let mut pulse = [[0u8; 3]; PULSE_ROWS];
        pulse[0] = [0x08, 0x00, 0x00];
        pulse[1] = [0x48, 0x10, 0x01];
        pulse[2] = [0x80, 0x20, 0x02];
        let mut filter = [[0u8; 3]; FILTER_ROWS];
        filter[1] = [0x40, 0xF1, 0x1F];

        let mut commands = [Command::default(); COMMAND_COUNT];
        commands[0] = Command {
            opcode: 0x01,
            params: 0x34,
        };
        commands[1] = Command {
            opcode: 0x05,
            params: 0x1A,
        };
        commands[2] = Command {
            opcode: 0x02,
            params: 0x47,
        };
        commands[3] = Command {
            opcode: 0x06,
            params: 0x11,
        };

        let sequences = reference_sequences();

        Self {
            load: Address(0x1000),
            table_shift: 0,
            broken_signature: false,
            speed: 2,
            instruments,
            wave,
            pulse,
            filter,
            commands,
            orderlists: [
                vec![entry(0, 0), entry(0, 3), entry(2, 0)],
                vec![entry(0, 1), entry(-2, 1)],
                vec![entry(0, 2), entry(0, 2), entry(12, 2)],
            ],
            sequences,
            dangling_voice: None,
            name: "Reference".to_string(),
            author: "Fixture".to_string(),
        }
    }

    /// Displace the table block by `$40` bytes.
    pub fn with_shifted_tables(mut self) -> Self {
        self.table_shift = 0x40;
        self
    }

    /// Replace the init jump with NOPs.
    pub fn with_broken_signature(mut self) -> Self {
        self.broken_signature = true;
        self
    }

    /// Point `voice`'s orderlist pointer at `target`.
    pub fn with_dangling_voice(mut self, voice: usize, target: Address) -> Self {
        self.dangling_voice = Some((voice, target));
        self
    }

    /// Load at a different address.
    pub fn at(mut self, load: Address) -> Self {
        self.load = load;
        self
    }

    fn table_base(&self) -> usize {
        offsets::WAVE_NOTE_OFFSETS as usize + self.table_shift as usize
    }

    /// Orderlist and sequence bytes plus the pointers into them.
    fn music_data(&self) -> (Vec<u8>, [Address; 3], [Address; SEQUENCE_SLOTS]) {
        let start = self
            .load
            .wrapping_add((offsets::MUSIC_DATA + self.table_shift) as u16);
        let mut data = Vec::new();
        let mut voices = [Address::ZERO; 3];
        for (voice, list) in self.orderlists.iter().enumerate() {
            if let Some((_, target)) = self.dangling_voice.filter(|(v, _)| *v == voice) {
                voices[voice] = target;
                continue;
            }
            voices[voice] = start.wrapping_add(data.len() as u16);
            for e in list {
                data.extend_from_slice(&[e.transpose as u8, e.sequence]);
            }
            data.push(0xFF);
        }
        let mut sequences = [Address::ZERO; SEQUENCE_SLOTS];
        for (slot, events) in self.sequences.iter().enumerate().take(SEQUENCE_SLOTS) {
            sequences[slot] = start.wrapping_add(data.len() as u16);
            data.extend(encode_sequence(events));
        }
        (data, voices, sequences)
    }

    /// Assemble the player, tables and music data.
    pub fn assemble(&self) -> Result<Assembled, AsmError> {
        let mut a = Assembler::new(self.load);
        if self.broken_signature {
            a.bytes(&[0xEA, 0xEA, 0xEA]);
        } else {
            a.jmp("init");
        }
        a.jmp("play");

        a.label("init")
            .imm(Ldx, 2)
            .label("init_voice")
            .absx(Lda, label("voice_lo"))
            .absx(Sta, label("ol_lo"))
            .absx(Lda, label("voice_hi"))
            .absx(Sta, label("ol_hi"))
            .imm(Lda, 0)
            .absx(Sta, label("ol_pos"))
            .absx(Sta, label("gate"))
            .absx(Sta, label("instr"))
            .absx(Sta, label("wavepos"))
            .absx(Sta, label("note"))
            .absx(Sta, label("duration"))
            .jsr("load_pattern")
            .imm(Lda, 1)
            .absx(Sta, label("count"))
            .implied(Dex)
            .branch(Bpl, "init_voice")
            .imm(Lda, 0x0F)
            .abs(Sta, fixed(0xD418))
            .imm(Lda, 1)
            .abs(Sta, label("tick"))
            .imm_lo(Lda, "commands")
            .zp(Sta, ZP_COMMANDS)
            .imm_hi(Lda, "commands")
            .zp(Sta, ZP_COMMANDS + 1)
            .implied(Rts);

        a.label("play")
            .abs(Dec, label("tick"))
            .branch(Bne, "effects")
            .abs(Lda, label("speed"))
            .abs(Sta, label("tick"))
            .imm(Ldx, 2)
            .label("seq_voice")
            .absx(Dec, label("count"))
            .branch(Bne, "seq_next")
            .jsr("fetch")
            .label("seq_next")
            .implied(Dex)
            .branch(Bpl, "seq_voice")
            .label("effects")
            .imm(Ldx, 2)
            .label("fx_voice")
            .jsr("wave_step")
            .implied(Dex)
            .branch(Bpl, "fx_voice")
            .implied(Rts);

        // X = voice
        a.label("load_pattern")
            .absx(Lda, label("ol_lo"))
            .zp(Sta, ZP_ORDER)
            .absx(Lda, label("ol_hi"))
            .zp(Sta, ZP_ORDER + 1)
            .absx(Ldy, label("ol_pos"))
            .indy(Lda, ZP_ORDER)
            .imm(Cmp, 0xFF)
            .branch(Bne, "lp_entry")
            .imm(Ldy, 0)
            .indy(Lda, ZP_ORDER)
            .label("lp_entry")
            .absx(Sta, label("transpose"))
            .implied(Iny)
            .indy(Lda, ZP_ORDER)
            .implied(Pha)
            .implied(Iny)
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
            .label("fetch_loop")
            .indy(Lda, ZP_SEQUENCE)
            .implied(Iny)
            .implied(Pha)
            .implied(Tya)
            .absx(Sta, label("seq_pos"))
            .implied(Pla)
            .imm(Cmp, 0xFF)
            .branch(Bne, "not_end")
            .jsr("load_pattern")
            .jmp("fetch")
            .label("not_end")
            .imm(Cmp, 0x60)
            .branch(Bcs, "not_note")
            .implied(Clc)
            .absx(Adc, label("transpose"))
            .absx(Sta, label("note"))
            .jsr("start_note")
            .jmp("timed")
            .label("not_note")
            .imm(Cmp, 0x7E)
            .branch(Bne, "not_release")
            .imm(Lda, 0)
            .absx(Sta, label("gate"))
            .jmp("timed")
            .label("not_release")
            .imm(Cmp, 0x7F)
            .branch(Beq, "timed")
            .imm(Cmp, 0x80)
            .branch(Bcc, "fetch_next")
            .imm(Cmp, 0xA0)
            .branch(Bcs, "not_duration")
            .imm(And, 0x1F)
            .absx(Sta, label("duration"))
            .jmp("fetch_next")
            .label("not_duration")
            .imm(Cmp, 0xC0)
            .branch(Bcs, "not_instrument")
            .imm(And, 0x1F)
            .absx(Sta, label("instr"))
            .jmp("fetch_next")
            .label("not_instrument")
            .imm(Cmp, 0xE0)
            .branch(Bcs, "fetch_next")
            .imm(And, 0x1F)
            .acc(Asl)
            .implied(Tay)
            .indy(Lda, ZP_COMMANDS)
            .imm(Cmp, 0x05)
            .branch(Bne, "fetch_next")
            .implied(Iny)
            .indy(Lda, ZP_COMMANDS)
            .absx(Ldy, label("voff"))
            .absy(Sta, fixed(0xD405))
            .label("fetch_next")
            .absx(Ldy, label("seq_pos"))
            .jmp("fetch_loop")
            .label("timed")
            .absx(Lda, label("duration"))
            .implied(Clc)
            .imm(Adc, 1)
            .absx(Sta, label("count"))
            .implied(Rts);

        a.label("start_note")
            .absx(Lda, label("instr"))
            .acc(Asl)
            .acc(Asl)
            .acc(Asl)
            .implied(Tay)
            .absy(Lda, Target::Label("instruments", 2))
            .absx(Sta, label("wavepos"))
            .absy(Lda, Target::Label("instruments", 3))
            .abs(Sta, label("tmp_pulse"))
            .absy(Lda, Target::Label("instruments", 4))
            .abs(Sta, label("tmp_filter"))
            .absy(Lda, Target::Label("instruments", 1))
            .implied(Pha)
            .absy(Lda, label("instruments"))
            .implied(Pha)
            .absx(Ldy, label("voff"))
            .implied(Pla)
            .absy(Sta, fixed(0xD405))
            .implied(Pla)
            .absy(Sta, fixed(0xD406))
            .abs(Lda, label("tmp_pulse"))
            .acc(Asl)
            .implied(Clc)
            .abs(Adc, label("tmp_pulse"))
            .implied(Tay)
            .absy(Lda, label("pulse"))
            .implied(Pha)
            .acc(Lsr)
            .acc(Lsr)
            .acc(Lsr)
            .acc(Lsr)
            .absx(Ldy, label("voff"))
            .absy(Sta, fixed(0xD403))
            .implied(Pla)
            .acc(Asl)
            .acc(Asl)
            .acc(Asl)
            .acc(Asl)
            .absy(Sta, fixed(0xD402))
            .abs(Lda, label("tmp_filter"))
            .branch(Beq, "sn_gate")
            .acc(Asl)
            .implied(Clc)
            .abs(Adc, label("tmp_filter"))
            .implied(Tay)
            .absy(Lda, label("filter"))
            .abs(Sta, fixed(0xD416))
            .absy(Lda, Target::Label("filter", 1))
            .abs(Sta, fixed(0xD417))
            .absy(Lda, Target::Label("filter", 2))
            .abs(Sta, fixed(0xD418))
            .label("sn_gate")
            .imm(Lda, 1)
            .absx(Sta, label("gate"))
            .implied(Rts);

        a.label("wave_step")
            .absx(Ldy, label("wavepos"))
            .absy(Lda, label("waveforms"))
            .imm(Cmp, WAVE_JUMP)
            .branch(Bne, "ws_play")
            .absy(Lda, label("wave_notes"))
            .absx(Sta, label("wavepos"))
            .implied(Tay)
            .absy(Lda, label("waveforms"))
            .label("ws_play")
            .imm(And, 0xFE)
            .absx(Ora, label("gate"))
            .implied(Pha)
            .absy(Lda, label("wave_notes"))
            .branch(Bmi, "ws_absolute")
            .implied(Clc)
            .absx(Adc, label("note"))
            .jmp("ws_clamp")
            .label("ws_absolute")
            .imm(And, 0x7F)
            .label("ws_clamp")
            .imm(Cmp, NOTE_COUNT as u8)
            .branch(Bcc, "ws_freq")
            .imm(Lda, NOTE_COUNT as u8 - 1)
            .label("ws_freq")
            .implied(Tay)
            .absy(Lda, label("freq_lo"))
            .abs(Sta, label("tmp_lo"))
            .absy(Lda, label("freq_hi"))
            .abs(Sta, label("tmp_hi"))
            .absx(Ldy, label("voff"))
            .abs(Lda, label("tmp_lo"))
            .absy(Sta, fixed(0xD400))
            .abs(Lda, label("tmp_hi"))
            .absy(Sta, fixed(0xD401))
            .implied(Pla)
            .absy(Sta, fixed(0xD404))
            .absx(Inc, label("wavepos"))
            .implied(Rts);

        a.label("voff").bytes(&[0, 7, 14]);
        for name in VOICE_VARS {
            a.label(name).bytes(&[0; 3]);
        }
        for name in ["tick", "tmp_pulse", "tmp_filter", "tmp_lo", "tmp_hi"] {
            a.label(name).bytes(&[0]);
        }
        let freq = pal_frequency_table();
        let lo: Vec<u8> = freq.iter().map(|f| *f as u8).collect();
        let hi: Vec<u8> = freq.iter().map(|f| (*f >> 8) as u8).collect();
        a.label("freq_lo").bytes(&lo);
        a.label("freq_hi").bytes(&hi);

        let (music, voices, sequences) = self.music_data();
        a.pad_to(self.table_base());
        a.label("wave_notes").bytes(&self.wave.note_offsets);
        a.label("waveforms").bytes(&self.wave.waveforms);
        a.label("speed").bytes(&[self.speed, 0]);
        a.label("voice_lo").bytes(&voices.map(|v| v.lo()));
        a.label("voice_hi").bytes(&voices.map(|v| v.hi()));
        a.label("seq_ptr_lo").bytes(&sequences.map(|s| s.lo()));
        a.label("seq_ptr_hi").bytes(&sequences.map(|s| s.hi()));
        let flat = |rows: &[TableRow]| rows.iter().flatten().copied().collect::<Vec<u8>>();
        a.label("filter").bytes(&flat(&self.filter));
        a.label("pulse").bytes(&flat(&self.pulse));
        let instruments: Vec<u8> = self.instruments.iter().flat_map(|i| i.to_row()).collect();
        a.label("instruments").bytes(&instruments);
        let commands: Vec<u8> = self
            .commands
            .iter()
            .flat_map(|c| [c.opcode, c.params])
            .collect();
        a.label("commands").bytes(&commands);
        debug_assert_eq!(
            a.here(),
            offsets::MUSIC_DATA as usize + self.table_shift as usize
        );
        a.bytes(&music);
        a.finish()
    }

    /// Header and image as a container parser would return them.
    ///
    /// # Panics
    ///
    /// Panics if the fixture description does not assemble.
    pub fn build(&self) -> (SidHeader, MemoryImage) {
        let assembled = self.assemble().expect("fixture player assembles");
        let init = if self.broken_signature {
            assembled.address_of("init").unwrap_or(self.load)
        } else {
            self.load
        };
        let header = SidHeader::new(self.load, init, self.load.wrapping_add(3)).with_strings(
            self.name.clone(),
            self.author.clone(),
            "2024 Fixture",
        );
        (header, MemoryImage::new(assembled.base, assembled.bytes))
    }

    /// Complete PSID file.
    pub fn to_psid(&self) -> Vec<u8> {
        let (header, image) = self.build();
        write_psid(&header, &image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidm2_cpu::{Emulator, EmulatorConfig};

    use crate::extract::sid_program;

    #[test]
    fn reference_player_plays_notes() {
        let (header, image) = Np21Fixture::reference().build();
        let trace = Emulator::trace(&sid_program(&header, &image), 100, &EmulatorConfig::default());
        assert!(trace.fault().is_none(), "{:?}", trace.fault());
        assert_eq!(trace.frames_completed(), 100);
        // voice 1 AD from instrument 0, voice 2 AD from instrument 1
        assert!(trace.writes().iter().any(|w| w.register == 0x05 && w.value == 0x09));
        assert!(trace.writes().iter().any(|w| w.register == 0x0C && w.value == 0x22));
        // envelope command on voice 2
        assert!(trace.writes().iter().any(|w| w.register == 0x0C && w.value == 0x1A));
        // filter row 1 from instrument 1
        assert!(trace.writes().iter().any(|w| w.register == 0x17 && w.value == 0xF1));
        // gated pulse waveform on voice 1
        assert!(trace.writes().iter().any(|w| w.register == 0x04 && w.value == 0x41));
    }

    #[test]
    fn shifted_player_sounds_the_same() {
        let config = EmulatorConfig::default();
        let (h1, i1) = Np21Fixture::reference().build();
        let (h2, i2) = Np21Fixture::reference().with_shifted_tables().build();
        let a = Emulator::trace(&sid_program(&h1, &i1), 80, &config);
        let b = Emulator::trace(&sid_program(&h2, &i2), 80, &config);
        assert_eq!(a.register_snapshots(), b.register_snapshots());
    }

    #[test]
    fn dangling_voice_does_not_crash_the_player() {
        let (header, image) = Np21Fixture::reference()
            .with_dangling_voice(1, Address(0xC000))
            .build();
        let trace = Emulator::trace(&sid_program(&header, &image), 50, &EmulatorConfig::default());
        assert!(trace.fault().is_none());
    }
}
