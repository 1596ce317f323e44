use domain::{DetectorError, DisplayValue};
use gds_decode::{DASHBOARD_WINDOW_LEN, DecodeError, decode_dashboard, decode_status_word};
use proptest::prelude::*;

fn window_strategy() -> impl Strategy<Value = Vec<u16>> {
    prop::collection::vec(any::<u16>(), DASHBOARD_WINDOW_LEN)
}

proptest! {
    #[test]
    fn alarm_bits_follow_register_zero(regs in window_strategy()) {
        let reading = decode_dashboard(&regs).unwrap();
        prop_assert_eq!(reading.alarm1_on, regs[0] & (1 << 6) != 0);
        prop_assert_eq!(reading.alarm2_on, regs[0] & (1 << 7) != 0);
    }

    #[test]
    fn alarm1_independent_of_other_bits(status in any::<u16>()) {
        let mut regs = vec![0u16; DASHBOARD_WINDOW_LEN];
        regs[0] = status | (1 << 6);
        prop_assert!(decode_dashboard(&regs).unwrap().alarm1_on);
        regs[0] = status & !(1 << 6);
        prop_assert!(!decode_dashboard(&regs).unwrap().alarm1_on);
    }

    #[test]
    fn lowest_set_error_bit_selects_code(error_reg in any::<u16>(), reading in any::<u16>()) {
        let mut regs = vec![0u16; DASHBOARD_WINDOW_LEN];
        regs[4] = reading;
        regs[7] = error_reg;
        let decoded = decode_dashboard(&regs).unwrap();
        let low = error_reg & 0x0F;
        if low == 0 {
            prop_assert_eq!(decoded.display, DisplayValue::Reading(reading));
        } else {
            let bit = low.trailing_zeros() as u8;
            let expected = DetectorError::from_bit(bit).unwrap();
            prop_assert_eq!(decoded.display, DisplayValue::Error(expected));
        }
        prop_assert_eq!(u16::from(decoded.error_bits), low);
    }

    #[test]
    fn progress_and_remaining_split_register_ten(value in any::<u16>()) {
        let mut regs = vec![0u16; DASHBOARD_WINDOW_LEN];
        regs[10] = value;
        let decoded = decode_dashboard(&regs).unwrap();
        prop_assert_eq!(u16::from(decoded.progress_percent), value & 0xFF);
        prop_assert_eq!(u16::from(decoded.remaining_seconds), (value >> 8) & 0xFF);
    }

    #[test]
    fn status_error_code_is_high_byte(raw in any::<u16>()) {
        let status = decode_status_word(&[raw]).unwrap();
        prop_assert_eq!(u16::from(status.error_code), raw >> 8);
        prop_assert_eq!(status.upgrading, raw & 0b100 != 0);
    }

    #[test]
    fn wrong_length_always_fails(regs in prop::collection::vec(any::<u16>(), 0..32)) {
        prop_assume!(regs.len() != DASHBOARD_WINDOW_LEN);
        prop_assert_eq!(
            decode_dashboard(&regs),
            Err(DecodeError::MalformedInput { expected: DASHBOARD_WINDOW_LEN, actual: regs.len() })
        );
    }
}
