/// Maps accented Latin letters to their base letter. Anything else is returned as-is.
pub fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

/// Lowercases and folds diacritics.
pub fn fold_lower(s: &str) -> String {
    s.chars()
        .map(fold_diacritic)
        .flat_map(char::to_lowercase)
        .collect()
}

/// Splits folded text into ASCII alphanumeric words.
pub fn words(s: &str) -> Vec<String> {
    fold_lower(s)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_spanish_accents() {
        assert_eq!(fold_lower("Ñandú Año Décimo"), "nandu ano decimo");
    }

    #[test]
    fn words_drops_punctuation() {
        assert_eq!(words("Edif. San-Martín 1234"), vec!["edif", "san", "martin", "1234"]);
    }
}
