//! National tax identifier (14 digits, two trailing modulo-11 check digits).

/// Number of digits in a normalized tax id.
pub const TAX_ID_LEN: usize = 14;

/// Weights for the second check digit. The first check digit uses the same
/// sequence shifted by one position.
const WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Strips every non-digit character.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Returns `true` when `raw` normalizes to a 14-digit id whose check digits match.
pub fn is_valid(raw: &str) -> bool {
    let digits: Vec<u32> = normalize(raw)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != TAX_ID_LEN {
        return false;
    }

    if digits.iter().all(|digit| *digit == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..12], &WEIGHTS[1..]);
    let second = check_digit(&digits[..13], &WEIGHTS);

    digits[12] == first && digits[13] == second
}

/// Renders a tax id as `NN.NNN.NNN/NNNN-NN`.
///
/// Input that does not normalize to 14 digits is returned unchanged.
pub fn format(raw: &str) -> String {
    let clean = normalize(raw);
    if clean.len() != TAX_ID_LEN {
        return raw.to_string();
    }
    format!(
        "{}.{}.{}/{}-{}",
        &clean[..2],
        &clean[2..5],
        &clean[5..8],
        &clean[8..12],
        &clean[12..]
    )
}

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits
        .iter()
        .zip(weights)
        .map(|(digit, weight)| digit * weight)
        .sum();
    match sum % 11 {
        remainder if remainder < 2 => 0,
        remainder => 11 - remainder,
    }
}
