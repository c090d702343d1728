//! Binary operator recognition.
//!
//! Tiers run from lowest to highest precedence. Splitting picks the lowest
//! tier present in the text and its rightmost top-level occurrence, so the
//! recursion in the lexer produces left-associative nesting.

use core_scan::find_all_top_level;

/// Precedence tiers, lowest binding first. Two-character glyphs precede the
/// single-character glyphs they contain so longest-match wins.
const TIERS: &[&[(&str, &str)]] = &[
    &[("||", "op.or")],
    &[("&&", "op.and")],
    &[("==", "op.equals"), ("!=", "op.nequals")],
    &[("<=", "op.lte"), (">=", "op.gte"), ("<", "op.lt"), (">", "op.gt")],
    &[("+", "op.add"), ("-", "op.subtract")],
    &[("*", "op.multiply"), ("/", "op.divide"), ("%", "op.mod")],
    &[("^", "op.pow")],
];

/// A successful binary split of an argument.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BinarySplit<'a> {
    pub glyph: &'static str,
    /// Dotted command the glyph maps to.
    pub command: &'static str,
    pub lhs: &'a str,
    pub rhs: &'a str,
}

/// Split `text` at its loosest-binding top-level operator, if any.
pub(crate) fn split_binary(text: &str) -> Option<BinarySplit<'_>> {
    for tier in TIERS {
        let mut best: Option<(usize, &'static str, &'static str)> = None;
        for (glyph, command) in *tier {
            for pos in find_all_top_level(text, glyph) {
                if !valid_operator_at(text, pos, glyph) {
                    continue;
                }
                if best.is_none_or(|(best_pos, _, _)| pos > best_pos) {
                    best = Some((pos, glyph, command));
                }
            }
        }
        if let Some((pos, glyph, command)) = best {
            return Some(BinarySplit {
                glyph,
                command,
                lhs: &text[..pos],
                rhs: &text[pos + glyph.len()..],
            });
        }
    }
    None
}

/// Reject glyph matches that are really part of something else: a longer
/// operator, a sign on a numeric literal, or a scientific-notation exponent.
fn valid_operator_at(text: &str, pos: usize, glyph: &str) -> bool {
    let before = text[..pos].chars().next_back();
    let after = text[pos + glyph.len()..].chars().next();

    // `<` / `>` inside `<=` / `>=` (the two-char form is its own tier entry).
    if (glyph == "<" || glyph == ">") && after == Some('=') {
        return false;
    }

    if glyph == "-" {
        // Leading minus is a sign, as is one following another operator or an
        // argument separator.
        let Some(prev) = before else { return false };
        if "(,+-*/%<>=&|^!:".contains(prev) {
            return false;
        }
        // `1e-5`: exponent minus inside a numeric literal.
        if prev == 'e' {
            let mut rev = text[..pos].chars().rev().skip(1);
            let mantissa = rev.next();
            if mantissa.is_some_and(|c| c.is_ascii_digit() || c == '.')
                && after.is_some_and(|c| c.is_ascii_digit())
            {
                return false;
            }
        }
    }

    // Any glyph at the very start has no left operand to bind.
    if pos == 0 && glyph != "-" {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_tier_wins() {
        let split = split_binary("1+2*3").unwrap();
        assert_eq!(split.command, "op.add");
        assert_eq!(split.lhs, "1");
        assert_eq!(split.rhs, "2*3");
    }

    #[test]
    fn rightmost_in_tier_wins() {
        let split = split_binary("10-4-3").unwrap();
        assert_eq!(split.command, "op.subtract");
        assert_eq!(split.lhs, "10-4");
        assert_eq!(split.rhs, "3");
    }

    #[test]
    fn leading_minus_is_not_an_operator() {
        assert!(split_binary("-5").is_none());
    }

    #[test]
    fn minus_after_operator_is_a_sign() {
        let split = split_binary("2*-3").unwrap();
        assert_eq!(split.command, "op.multiply");
        assert_eq!(split.rhs, "-3");
    }

    #[test]
    fn exponent_minus_is_part_of_the_literal() {
        assert!(split_binary("1e-5").is_none());
        let split = split_binary("1e-5+2").unwrap();
        assert_eq!(split.command, "op.add");
        assert_eq!(split.lhs, "1e-5");
    }

    #[test]
    fn comparator_two_char_not_split_as_one() {
        let split = split_binary("$a<=3").unwrap();
        assert_eq!(split.command, "op.lte");
    }

    #[test]
    fn parenthesised_operators_are_opaque() {
        assert!(split_binary("op.add(1,2+3)").is_none());
    }

    #[test]
    fn string_operators_are_opaque() {
        assert!(split_binary("\"1+2\"").is_none());
    }

    #[test]
    fn logical_tiers_bind_loosest() {
        let split = split_binary("$a>0&&$b<5").unwrap();
        assert_eq!(split.command, "op.and");
        assert_eq!(split.lhs, "$a>0");
        assert_eq!(split.rhs, "$b<5");
    }
}
