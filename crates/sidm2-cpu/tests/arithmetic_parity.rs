use proptest::prelude::*;
use sidm2_common::{Address, MemoryImage};
use sidm2_cpu::{Emulator, EmulatorConfig, SidProgram};

/// Runs `SED/CLD; SEC/CLC; LDA #a; ADC/SBC #b; STA $D400; PHP; PLA; STA $D401`
/// and returns (result, status) as seen on the SID bus.
fn run_op(decimal: bool, carry: bool, subtract: bool, a: u8, b: u8) -> (u8, u8) {
    let code = vec![
        if decimal { 0xF8 } else { 0xD8 },
        if carry { 0x38 } else { 0x18 },
        0xA9,
        a,
        if subtract { 0xE9 } else { 0x69 },
        b,
        0x8D,
        0x00,
        0xD4,
        0x08,
        0x68,
        0x8D,
        0x01,
        0xD4,
        0x60,
    ];
    let program = SidProgram {
        image: MemoryImage::new(Address(0x1000), code),
        init: Address(0x1000),
        play: Address(0x100E),
        subtune: 0,
    };
    let trace = Emulator::trace(&program, 1, &EmulatorConfig::default());
    let writes = trace.frame_writes(0);
    (writes[0].value, writes[1].value)
}

fn to_bcd(n: u8) -> u8 {
    ((n / 10) << 4) | (n % 10)
}

proptest! {
    #[test]
    fn binary_adc_matches_reference(a in any::<u8>(), b in any::<u8>(), c in any::<bool>()) {
        let (result, status) = run_op(false, c, false, a, b);
        let wide = a as u16 + b as u16 + c as u16;
        prop_assert_eq!(result, wide as u8);
        prop_assert_eq!(status & 0x01 != 0, wide > 0xFF);
        let signed = a as i8 as i16 + b as i8 as i16 + c as i16;
        prop_assert_eq!(status & 0x40 != 0, !(-128..=127).contains(&signed));
        prop_assert_eq!(status & 0x02 != 0, result == 0);
    }

    #[test]
    fn binary_sbc_matches_reference(a in any::<u8>(), b in any::<u8>(), c in any::<bool>()) {
        let (result, status) = run_op(false, c, true, a, b);
        let wide = a as i16 - b as i16 - (!c) as i16;
        prop_assert_eq!(result, wide as u8);
        prop_assert_eq!(status & 0x01 != 0, wide >= 0);
        let signed = a as i8 as i16 - b as i8 as i16 - (!c) as i16;
        prop_assert_eq!(status & 0x40 != 0, !(-128..=127).contains(&signed));
    }

    #[test]
    fn decimal_adc_on_valid_bcd(a in 0u8..100, b in 0u8..100, c in any::<bool>()) {
        let (result, status) = run_op(true, c, false, to_bcd(a), to_bcd(b));
        let sum = a as u16 + b as u16 + c as u16;
        prop_assert_eq!(result, to_bcd((sum % 100) as u8));
        prop_assert_eq!(status & 0x01 != 0, sum >= 100);
    }

    #[test]
    fn decimal_sbc_on_valid_bcd(a in 0u8..100, b in 0u8..100, c in any::<bool>()) {
        let (result, status) = run_op(true, c, true, to_bcd(a), to_bcd(b));
        let diff = a as i16 - b as i16 - (!c) as i16;
        prop_assert_eq!(result, to_bcd(diff.rem_euclid(100) as u8));
        prop_assert_eq!(status & 0x01 != 0, diff >= 0);
    }
}
