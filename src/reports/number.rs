use crate::storage::now_millis;
use rand::Rng;

const SUFFIX_SPACE: u32 = 100_000_000;

/// Produces report number candidates. Creation checks every candidate for
/// uniqueness, so a source only needs to make collisions unlikely.
pub trait ReportNumberSource: Send + Sync {
    /// Candidate for the given 0-based attempt of a single creation.
    fn candidate(&self, attempt: u32) -> String;
}

/// `<prefix><8 digits>`: the first attempt takes the last eight digits of the
/// millisecond clock, rerolls draw a random suffix.
#[derive(Debug, Clone)]
pub struct TimeSuffixNumbers {
    prefix: String,
}

impl TimeSuffixNumbers {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ReportNumberSource for TimeSuffixNumbers {
    fn candidate(&self, attempt: u32) -> String {
        let suffix = if attempt == 0 {
            now_millis().rem_euclid(i64::from(SUFFIX_SPACE)) as u32
        } else {
            rand::thread_rng().gen_range(0..SUFFIX_SPACE)
        };
        format!("{}{:08}", self.prefix, suffix)
    }
}

/// Whether `number` has the shape `<prefix><8 digits>`.
pub fn is_well_formed(number: &str, prefix: &str) -> bool {
    number
        .strip_prefix(prefix)
        .is_some_and(|digits| digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()))
}
