//! Repair for mixed-alphabet text in grid cards.
//!
//! Card titles coming out of the grid view occasionally mix Cyrillic
//! capitals into otherwise-Latin words (and vice versa) because the
//! registry's own data entry uses whichever keyboard layout was active.
//! The repair maps the eleven Cyrillic capitals that are pixel-identical
//! to Latin ones onto their Latin twins, which normalizes Latin brand
//! names without touching genuinely Cyrillic words that use letters
//! outside the lookalike set.

/// Replaces Cyrillic capitals that render identically to Latin capitals
/// with their Latin counterparts.
#[must_use]
pub fn fix_mixed_characters(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'А' => 'A',
            'В' => 'B',
            'С' => 'C',
            'Е' => 'E',
            'Н' => 'H',
            'К' => 'K',
            'М' => 'M',
            'О' => 'O',
            'Р' => 'P',
            'Т' => 'T',
            'Х' => 'X',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::fix_mixed_characters;

    #[test]
    fn maps_lookalike_cyrillic_capitals_to_latin() {
        // "СОСА-СOLA" with Cyrillic С/О/А becomes plain ASCII
        assert_eq!(fix_mixed_characters("СОСА-СOLA"), "COCA-COLA");
    }

    #[test]
    fn leaves_distinct_cyrillic_letters_alone() {
        assert_eq!(fix_mixed_characters("Щит и меч"), "Щит и меч");
    }

    #[test]
    fn passes_ascii_through() {
        assert_eq!(fix_mixed_characters("TURBO 3000"), "TURBO 3000");
    }
}
