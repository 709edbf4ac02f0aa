use rand::distributions::Alphanumeric;
use rand::Rng;

const BOOKING_REF_PREFIX: &str = "BRB";
const BOOKING_REF_LEN: usize = 8;

/// Generate a human-readable booking reference, e.g. `BRB-7K2M9QX4`.
///
/// References are random rather than sequential so they leak nothing about
/// booking volume. Uniqueness is enforced by the booking store on insert.
pub fn new_booking_ref() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_uppercase())
        .filter(|c| c.is_ascii_alphanumeric())
        .take(BOOKING_REF_LEN)
        .collect();
    format!("{}-{}", BOOKING_REF_PREFIX, suffix)
}
