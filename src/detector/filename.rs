//! Character-level entropy of file names
//!
//! Ransomware often renames its victims to short random strings. Such names
//! use many distinct characters with few repeats, which shows up as high
//! character entropy compared to names written by people.

use std::collections::HashMap;

/// Shannon entropy over the characters of a name, in bits per character
pub fn calculate(name: &str) -> f64 {
    let mut frequency: HashMap<char, u32> = HashMap::new();
    let mut total = 0u32;
    for c in name.chars() {
        *frequency.entry(c).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return 0.0;
    }

    let len = total as f64;
    let entropy: f64 = frequency
        .values()
        .map(|&count| {
            let probability = count as f64 / len;
            -probability * probability.log2()
        })
        .sum();

    entropy.max(0.0)
}

/// Entropy relative to the most a name of this length can reach, from 0 to 1
///
/// Absolute entropy is capped at log2 of the length, so short names never
/// reach a fixed threshold however random they are.
pub fn normalized(name: &str) -> f64 {
    let len = name.chars().count();
    if len < 2 {
        return 0.0;
    }
    (calculate(name) / (len as f64).log2()).min(1.0)
}

#[derive(PartialEq, Clone, Copy)]
enum CharClass {
    Lower,
    Upper,
    Digit,
    Other,
}

fn char_class(c: char) -> CharClass {
    if c.is_lowercase() {
        CharClass::Lower
    } else if c.is_uppercase() {
        CharClass::Upper
    } else if c.is_numeric() {
        CharClass::Digit
    } else {
        CharClass::Other
    }
}

/// Share of neighbouring characters that switch between letter case, digits and symbols
///
/// Words, dates and camel case switch rarely; generated names switch on
/// almost every character.
pub fn class_switches(name: &str) -> f64 {
    let classes: Vec<CharClass> = name.chars().map(char_class).collect();
    if classes.len() < 2 {
        return 0.0;
    }
    let switches = classes.windows(2).filter(|pair| pair[0] != pair[1]).count();
    switches as f64 / (classes.len() - 1) as f64
}

/// Name without its last extension
pub fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}
