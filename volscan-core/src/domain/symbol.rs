use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized ticker symbol: trimmed, upper-cased, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Normalize raw input into a symbol. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "symbol must not be blank".to_string())
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_uppercases() {
        assert_eq!(Symbol::parse("  msft ").unwrap().as_str(), "MSFT");
        assert_eq!(Symbol::parse("brk.b").unwrap().as_str(), "BRK.B");
    }

    #[test]
    fn parse_rejects_blank() {
        assert!(Symbol::parse("").is_none());
        assert!(Symbol::parse("   \t").is_none());
    }

    #[test]
    fn serde_uses_plain_string() {
        let sym = Symbol::parse("aapl").unwrap();
        assert_eq!(serde_json::to_string(&sym).unwrap(), "\"AAPL\"");
        let back: Symbol = serde_json::from_str("\" spy \"").unwrap();
        assert_eq!(back.as_str(), "SPY");
        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
    }
}
