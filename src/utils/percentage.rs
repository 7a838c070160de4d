use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. {
            None
        } else {
            Some(Percentage(value))
        }
    }

    pub fn rounded(&self) -> u8 {
        self.0.round().clamp(0., 100.) as u8
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // This means that 100%% also works, but I think I'm fine with that
        let s = s.trim_end_matches("%");
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `whole` taken by `value`, both in milliseconds. An empty whole is 0%.
pub fn share(value: u64, whole: u64) -> Percentage {
    if whole == 0 {
        return Percentage(0.);
    }
    Percentage(value as f64 / whole as f64 * 100.)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_sign() {
        assert_eq!("12.5%".parse::<Percentage>().unwrap(), Percentage(12.5));
        assert_eq!("3".parse::<Percentage>().unwrap(), Percentage(3.));
        assert!("-1".parse::<Percentage>().is_err());
    }

    #[test]
    fn share_of_empty_whole_is_zero() {
        assert_eq!(share(10, 0), Percentage(0.));
        assert_eq!(share(600_000, 1_000_000).rounded(), 60);
    }
}
