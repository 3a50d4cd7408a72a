//! Purchase order codes: `PO` + `YYMMDD` + `-` + four random digits.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;

pub const ORDER_CODE_PREFIX: &str = "PO";

/// Generate a code for an order placed on `date`.
///
/// The suffix space is only 10 000 codes per day, so callers must handle
/// collisions.
pub fn generate_order_code<R: Rng + ?Sized>(date: NaiveDate, rng: &mut R) -> String {
    let suffix: u16 = rng.gen_range(0..10_000);
    format!("{ORDER_CODE_PREFIX}{}-{suffix:04}", date.format("%y%m%d"))
}

/// Generate a code dated `now` using the thread-local RNG.
pub fn new_order_code(now: DateTime<Utc>) -> String {
    generate_order_code(now.date_naive(), &mut rand::thread_rng())
}

/// Shape check: `PO`, six date digits, a dash, four digits.
pub fn is_well_formed_order_code(code: &str) -> bool {
    let Some(rest) = code.strip_prefix(ORDER_CODE_PREFIX) else {
        return false;
    };
    let bytes = rest.as_bytes();
    bytes.len() == 11
        && bytes[6] == b'-'
        && bytes[..6].iter().all(u8::is_ascii_digit)
        && bytes[7..].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn code_embeds_the_order_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_order_code(date, &mut rng);

        assert!(code.starts_with("PO250307-"));
        assert!(is_well_formed_order_code(&code));
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(!is_well_formed_order_code("PO250307"));
        assert!(!is_well_formed_order_code("XX250307-0001"));
        assert!(!is_well_formed_order_code("PO2503a7-0001"));
        assert!(!is_well_formed_order_code("PO250307-00012"));
    }

    proptest! {
        /// Property: every generated code is well formed, whatever the seed.
        #[test]
        fn generated_codes_are_well_formed(seed in any::<u64>(), day in 1u32..=28, month in 1u32..=12) {
            let date = NaiveDate::from_ymd_opt(2030, month, day).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            prop_assert!(is_well_formed_order_code(&generate_order_code(date, &mut rng)));
        }
    }
}
