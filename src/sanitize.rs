//! Normalisation of text coming back from the generator.

/// Cleans generated text so it can be embedded in prompts and records.
///
/// Removes every `"` and `'`, collapses whitespace runs (newlines included)
/// into single spaces, drops control characters and trims the ends.
/// Non-ASCII printable characters are kept. Idempotent.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch == '"' || ch == '\'' {
            continue;
        }
        // U+001C..=U+001F are field separators, not plain control codes
        if ch.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&ch) {
            pending_space = true;
            continue;
        }
        if (ch as u32) < 32 {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_quotes_and_collapses_lines() {
        let raw = "  \"Use o 'Stop Loss'\"\n\n  sempre.\r\nDica:   1% ";
        assert_eq!(sanitize(raw), "Use o Stop Loss sempre. Dica: 1%");
    }

    #[test]
    fn removes_control_characters_keeps_non_ascii() {
        let raw = "Análise\u{0007} de suporte\u{001b} e resistência — ação";
        assert_eq!(sanitize(raw), "Análise de suporte e resistência — ação");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "",
            "   ",
            "\"'\"",
            "a\tb\u{000b}c\u{0000}d",
            "linha 1\nlinha 2\r\n\r\nlinha 3",
            "preço: R$ 5.000,00 \u{00a0} ok",
            "'aspas' \"duplas\"\u{0001}",
        ];
        for sample in samples {
            let once = sanitize(sample);
            assert_eq!(sanitize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn output_has_no_quotes_or_control_points() {
        let raw = "x\u{0001}\"y\"\u{001f}'z'\n\u{0009}w";
        let cleaned = sanitize(raw);
        assert!(
            cleaned
                .chars()
                .all(|ch| (ch as u32) >= 32 && ch != '"' && ch != '\'')
        );
        assert_eq!(cleaned, "xy z w");
    }

    #[test]
    fn separator_controls_split_words() {
        assert_eq!(sanitize("a\u{1f}b"), "a b");
        assert_eq!(sanitize("day\u{1c}\u{1d}\u{1e}trade "), "day trade");
    }

    #[test]
    fn control_character_between_words_does_not_join_spacing() {
        // a lone control char is removed, not turned into a space
        assert_eq!(sanitize("day\u{0002}trade"), "daytrade");
    }
}
