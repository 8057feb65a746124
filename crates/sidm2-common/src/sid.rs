//! SID register map.
//!
//! The sound chip occupies `$D400-$D41C`; the first 25 registers are
//! write-only control registers and are the only ones recorded in traces.
//! The chip is mirrored every 32 bytes up to `$D7FF`.

use crate::Address;

/// Base address of the SID I/O page.
pub const SID_BASE: Address = Address(0xD400);

/// One past the last address decoded to the SID (mirrors included).
pub const SID_PAGE_END: u32 = 0xD800;

/// Number of writable registers.
pub const REGISTER_COUNT: usize = 25;

/// Register stride between voices.
pub const VOICE_STRIDE: u8 = 7;

/// Frequency low byte (voice-relative).
pub const FREQ_LO: u8 = 0x00;
/// Frequency high byte (voice-relative).
pub const FREQ_HI: u8 = 0x01;
/// Pulse width low byte (voice-relative).
pub const PW_LO: u8 = 0x02;
/// Pulse width high nibble (voice-relative).
pub const PW_HI: u8 = 0x03;
/// Control register: waveform, test, ring, sync, gate (voice-relative).
pub const CONTROL: u8 = 0x04;
/// Attack/decay (voice-relative).
pub const ATTACK_DECAY: u8 = 0x05;
/// Sustain/release (voice-relative).
pub const SUSTAIN_RELEASE: u8 = 0x06;

/// Filter cutoff low bits.
pub const FILTER_CUTOFF_LO: u8 = 0x15;
/// Filter cutoff high byte.
pub const FILTER_CUTOFF_HI: u8 = 0x16;
/// Filter resonance and voice routing.
pub const FILTER_RES_ROUTING: u8 = 0x17;
/// Filter mode and master volume.
pub const MODE_VOLUME: u8 = 0x18;

/// All filter registers.
pub const FILTER_REGISTERS: [u8; 4] = [
    FILTER_CUTOFF_LO,
    FILTER_CUTOFF_HI,
    FILTER_RES_ROUTING,
    MODE_VOLUME,
];

/// Gate bit in the control register.
pub const GATE_BIT: u8 = 0x01;

/// Triangle waveform bit in the control register.
pub const WAVE_TRIANGLE: u8 = 0x10;

/// Notes covered by the frequency table (C-0 .. B-7).
pub const NOTE_COUNT: usize = 96;

/// PAL system clock in Hz.
pub const PAL_CLOCK_HZ: f64 = 985_248.0;

/// Frequency register value for a note on a PAL machine (A-4 = note 57 =
/// 440 Hz, equal temperament).
pub fn pal_note_frequency(note: u8) -> u16 {
    let hz = 440.0 * 2f64.powf((f64::from(note) - 57.0) / 12.0);
    let value = (hz * 16_777_216.0 / PAL_CLOCK_HZ).round();
    value.min(f64::from(u16::MAX)) as u16
}

/// Frequency register values for all [`NOTE_COUNT`] notes.
pub fn pal_frequency_table() -> [u16; NOTE_COUNT] {
    std::array::from_fn(|note| pal_note_frequency(note as u8))
}

/// Absolute register index for a voice-relative register.
#[inline]
pub const fn voice_register(voice: usize, reg: u8) -> u8 {
    voice as u8 * VOICE_STRIDE + reg
}

/// Map an I/O address to a writable register index, if it decodes to one.
#[inline]
pub fn register_for_address(addr: Address) -> Option<u8> {
    let raw = addr.get() as u32;
    if !(SID_BASE.get() as u32..SID_PAGE_END).contains(&raw) {
        return None;
    }
    let reg = (raw & 0x1F) as u8;
    ((reg as usize) < REGISTER_COUNT).then_some(reg)
}

/// Voice owning a register, or `None` for the filter/volume block.
#[inline]
pub const fn voice_of(reg: u8) -> Option<usize> {
    if reg < 3 * VOICE_STRIDE {
        Some((reg / VOICE_STRIDE) as usize)
    } else {
        None
    }
}

/// Human readable register name (voice-qualified).
pub fn register_name(reg: u8) -> String {
    const VOICE_NAMES: [&str; 7] = ["FREQ_LO", "FREQ_HI", "PW_LO", "PW_HI", "CTRL", "AD", "SR"];
    match voice_of(reg) {
        Some(voice) => format!(
            "V{}_{}",
            voice + 1,
            VOICE_NAMES[(reg % VOICE_STRIDE) as usize]
        ),
        None => match reg {
            FILTER_CUTOFF_LO => "FC_LO".to_string(),
            FILTER_CUTOFF_HI => "FC_HI".to_string(),
            FILTER_RES_ROUTING => "RES_FILT".to_string(),
            MODE_VOLUME => "MODE_VOL".to_string(),
            other => format!("REG_{other:02X}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_decode_to_the_same_register() {
        assert_eq!(register_for_address(Address(0xD404)), Some(4));
        assert_eq!(register_for_address(Address(0xD424)), Some(4));
        assert_eq!(register_for_address(Address(0xD7F8)), Some(0x18));
    }

    #[test]
    fn read_only_registers_are_not_recorded() {
        assert_eq!(register_for_address(Address(0xD419)), None);
        assert_eq!(register_for_address(Address(0xD41B)), None);
        assert_eq!(register_for_address(Address(0xD800)), None);
        assert_eq!(register_for_address(Address(0xD3FF)), None);
    }

    #[test]
    fn voice_registers_are_strided() {
        assert_eq!(voice_register(2, CONTROL), 0x12);
        assert_eq!(voice_of(0x12), Some(2));
        assert_eq!(voice_of(MODE_VOLUME), None);
        assert_eq!(register_name(0x0B), "V2_CTRL");
    }

    #[test]
    fn frequency_table_is_monotonic() {
        let table = pal_frequency_table();
        assert_eq!(pal_note_frequency(57), 7493);
        assert!(table.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table[NOTE_COUNT - 1], pal_note_frequency(95));
    }
}
