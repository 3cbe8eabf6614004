//! Character-regex flags.
//!
//! `ENV.defaultStringPatternFlags` historically carries the integer bitmask
//! of `java.util.regex.Pattern`. The engine accepts that bitmask as-is, and
//! also a string of named flags (`"i"`, `"m"`, `"s"`, `"x"`) which is mapped
//! onto the same bits on ingest.

use regex::RegexBuilder;

bitflags::bitflags! {
    /// Flags ORed into every bare character regex.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PatternFlags: u32 {
        const UNIX_LINES       = 1 << 0;
        const CASE_INSENSITIVE = 1 << 1;
        const COMMENTS         = 1 << 2;
        const MULTILINE        = 1 << 3;
        const LITERAL          = 1 << 4;
        const DOTALL           = 1 << 5;
        const UNICODE_CASE     = 1 << 6;
        const CANON_EQ         = 1 << 7;
        const UNICODE_CLASS    = 1 << 8;
    }
}

/// Bits that are accepted but have no effect on the `regex` crate.
const IGNORED: PatternFlags = PatternFlags::UNIX_LINES
    .union(PatternFlags::LITERAL)
    .union(PatternFlags::UNICODE_CASE)
    .union(PatternFlags::CANON_EQ)
    .union(PatternFlags::UNICODE_CLASS);

impl PatternFlags {
    /// Interpret a legacy integer bitmask.
    pub fn from_legacy(bits: i64) -> Result<Self, String> {
        let raw = u32::try_from(bits).map_err(|_| format!("pattern flags {bits} out of range"))?;
        let flags = PatternFlags::from_bits(raw).ok_or_else(|| format!("unknown pattern flag bits in {raw:#x}"))?;
        if flags.intersects(IGNORED) {
            log::debug!("pattern flags {:?} have no effect and are ignored", flags.intersection(IGNORED));
        }
        Ok(flags)
    }

    /// Interpret named flags such as `"i"` or `"ms"`.
    pub fn from_names(names: &str) -> Result<Self, String> {
        let mut flags = PatternFlags::empty();
        for c in names.chars() {
            flags |= match c {
                'i' => PatternFlags::CASE_INSENSITIVE,
                'm' => PatternFlags::MULTILINE,
                's' => PatternFlags::DOTALL,
                'x' => PatternFlags::COMMENTS,
                'u' => PatternFlags::UNICODE_CASE,
                c if c.is_whitespace() || c == ',' => continue,
                other => return Err(format!("unknown pattern flag '{other}'")),
            };
        }
        Ok(flags)
    }

    /// Apply the flags to a regex builder. Inline flags in the pattern text
    /// (`(?-i)`) still override these defaults.
    pub fn configure(self, builder: &mut RegexBuilder) {
        builder
            .case_insensitive(self.contains(PatternFlags::CASE_INSENSITIVE))
            .ignore_whitespace(self.contains(PatternFlags::COMMENTS))
            .multi_line(self.contains(PatternFlags::MULTILINE))
            .dot_matches_new_line(self.contains(PatternFlags::DOTALL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_two_is_case_insensitive() {
        assert_eq!(PatternFlags::from_legacy(2).unwrap(), PatternFlags::CASE_INSENSITIVE);
    }

    #[test]
    fn named_flags_map_to_legacy_bits() {
        let flags = PatternFlags::from_names("is").unwrap();
        assert_eq!(flags.bits(), 2 | 32);
    }

    #[test]
    fn rejects_unknown_bits_and_names() {
        assert!(PatternFlags::from_legacy(1 << 12).is_err());
        assert!(PatternFlags::from_legacy(-1).is_err());
        assert!(PatternFlags::from_names("q").is_err());
    }

    #[test]
    fn inline_flag_overrides_default() {
        let mut builder = RegexBuilder::new("(?-i)Red");
        PatternFlags::CASE_INSENSITIVE.configure(&mut builder);
        let re = builder.build().unwrap();
        assert!(re.is_match("Red"));
        assert!(!re.is_match("red"));
    }
}
