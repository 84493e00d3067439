//! Identifier tokenizer for archetype and macro ids
//!
//! Ship ids in `ships.xml` and macro ids in the unit files describe the
//! same hull with the same vocabulary (race, size, role) but in a
//! different order and with different spellings:
//!
//! ```text
//! ships.xml   argon_destroyer_l_01        group arg_destroyer_l
//! macro       ship_arg_l_destroyer_01_a_macro
//! ```
//!
//! [`tokenize`] reduces both to the same [`TokenSet`] so that matching
//! becomes plain set arithmetic.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// Faction words that appear in ship ids, mapped to the race code used in
/// macro ids.
const RACE_ALIASES: &[(&str, &str)] = &[
    ("argon", "arg"),
    ("antigone", "ant"),
    ("hatikvah", "arg"),
    ("paranid", "par"),
    ("holyorder", "par"),
    ("teladi", "tel"),
    ("ministry", "tel"),
    ("split", "spl"),
    ("zyarth", "spl"),
    ("freesplit", "spl"),
    ("terran", "ter"),
    ("pioneer", "pio"),
    ("pioneers", "pio"),
    ("boron", "bor"),
    ("xenon", "xen"),
    ("yaki", "yak"),
    ("vigor", "vig"),
    ("riptide", "rip"),
    ("khaak", "kha"),
    ("scaleplate", "sca"),
    ("buccaneers", "buc"),
];

/// Three letter race codes found directly in macro ids.
const RACE_CODES: &[&str] = &[
    "arg", "ant", "par", "tel", "spl", "ter", "pio", "bor", "xen", "yak", "vig", "rip", "kha",
    "sca", "buc", "gen",
];

const ROLE_SYNONYMS: &[(&str, &str)] = &[("trader", "trans"), ("transport", "trans")];

const NOISE: &[&str] = &["ship", "macro"];

const SIZE_LETTERS: &[&str] = &["s", "m", "l"];

/// Race code for a faction word or code, e.g. `argon` -> `arg`.
pub fn race_code(word: &str) -> Option<&'static str> {
    let word = word.trim().to_ascii_lowercase();
    if let Some((_, code)) = RACE_ALIASES.iter().find(|(alias, _)| *alias == word) {
        return Some(*code);
    }
    RACE_CODES.iter().find(|c| **c == word).copied()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_race(&self) -> bool {
        RACE_CODES.contains(&self.0.as_str())
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of normalized identifier tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TokenSet(BTreeSet<Token>);

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Size of the intersection with `other`.
    pub fn overlap(&self, other: &TokenSet) -> usize {
        self.0.intersection(&other.0).count()
    }

    /// Race codes present in the set.
    pub fn races(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|t| t.is_race()).map(|t| t.as_str())
    }

    pub fn union(mut self, other: TokenSet) -> TokenSet {
        self.0.extend(other.0);
        self
    }
}

impl fmt::Display for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(|t| t.as_str()).collect();
        write!(f, "{{{}}}", joined.join(", "))
    }
}

fn normalize(part: &str) -> Option<Token> {
    if part.is_empty() || part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if NOISE.contains(&part) {
        return None;
    }
    // revision letters (_a, _b) carry no meaning; size letters do
    if part.len() == 1 && part.chars().all(|c| c.is_ascii_alphabetic()) && !SIZE_LETTERS.contains(&part)
    {
        return None;
    }
    if let Some((_, code)) = RACE_ALIASES.iter().find(|(alias, _)| *alias == part) {
        return Some(Token(code.to_string()));
    }
    if let Some((_, canon)) = ROLE_SYNONYMS.iter().find(|(word, _)| *word == part) {
        return Some(Token(canon.to_string()));
    }
    Some(Token(part.to_string()))
}

/// Split an identifier into its meaningful tokens.
pub fn tokenize(ident: &str) -> TokenSet {
    let lower = ident.to_ascii_lowercase();
    let tokens = lower
        .split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter_map(normalize)
        .collect();
    TokenSet(tokens)
}

/// Tokenize several identifiers into one set.
pub fn tokenize_all<'a>(idents: impl IntoIterator<Item = &'a str>) -> TokenSet {
    idents
        .into_iter()
        .fold(TokenSet::new(), |acc, ident| acc.union(tokenize(ident)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(set: &TokenSet) -> Vec<&str> {
        set.iter().map(|t| t.as_str()).collect()
    }

    #[test]
    fn macro_id_drops_sequence_and_revision() {
        let set = tokenize("ship_arg_l_destroyer_01_a_macro");
        assert_eq!(strs(&set), vec!["arg", "destroyer", "l"]);
    }

    #[test]
    fn archetype_and_macro_share_vocabulary() {
        let archetype = tokenize("argon_destroyer_l_01");
        let hull = tokenize("ship_arg_l_destroyer_01_a_macro");
        assert_eq!(archetype, hull);
        assert_eq!(archetype.overlap(&hull), 3);
    }

    #[test]
    fn trader_and_trans_collapse() {
        let archetype = tokenize("teladi_trader_m");
        let hull = tokenize("ship_tel_m_trans_container_01_a_macro");
        assert_eq!(archetype.overlap(&hull), 3);
        assert!(hull.contains("container"));
    }

    #[test]
    fn size_letters_survive() {
        for ident in ["foo_s_bar", "foo_m_bar", "foo_l_bar", "foo_xl_bar"] {
            assert_eq!(tokenize(ident).len(), 3, "{ident}");
        }
        assert!(!tokenize("foo_b_bar").contains("b"));
    }

    #[test]
    fn races_are_reported() {
        let set = tokenize_all(["holyorder_fighter_s", "par_fighter_s_01"]);
        assert_eq!(set.races().collect::<Vec<_>>(), vec!["par"]);
        assert_eq!(race_code("Argon"), Some("arg"));
        assert_eq!(race_code("xen"), Some("xen"));
        assert_eq!(race_code("nobody"), None);
    }

    #[test]
    fn display_is_sorted() {
        assert_eq!(tokenize("ship_bor_s_scout").to_string(), "{bor, s, scout}");
    }
}
