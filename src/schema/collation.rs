//! Collation codes accepted at table and column level

use serde::{Deserialize, Serialize};

macro_rules! collations {
    ($($variant:ident => $code:literal),+ $(,)?) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Collation {
            $($variant),+
        }

        impl Collation {
            pub const ALL: &'static [Collation] = &[$(Collation::$variant),+];

            pub fn code(self) -> &'static str {
                match self {
                    $(Collation::$variant => $code),+
                }
            }
        }
    };
}

collations! {
    Ar => "AR",
    Binary => "BINARY",
    Cs => "CS",
    CsCi => "CS_CI",
    CsCiAi => "CS_CI_AI",
    Da => "DA",
    De => "DE",
    El => "EL",
    EnGb => "EN_GB",
    EnUs => "EN_US",
    EnUsCi => "EN_US_CI",
    Es => "ES",
    EsCiAi => "ES_CI_AI",
    Et => "ET",
    Fi => "FI",
    FrCa => "FR_CA",
    FrFr => "FR_FR",
    FrFrCiAi => "FR_FR_CI_AI",
    He => "HE",
    Hu => "HU",
    Is => "IS",
    It => "IT",
    Ja => "JA",
    JaJis => "JA_JIS",
    Ko => "KO",
    Lt => "LT",
    Lv => "LV",
    NlNl => "NL_NL",
    Nn => "NN",
    Pl => "PL",
    PtBr => "PT_BR",
    PtBrCiAi => "PT_BR_CI_AI",
    PtPt => "PT_PT",
    Root => "ROOT",
    Ru => "RU",
    Sl => "SL",
    SvFi => "SV_FI",
    SvSe => "SV_SE",
    Tr => "TR",
    Uk => "UK",
    Vi => "VI",
    ZhHansCn => "ZH_HANS_CN",
    ZhHantTw => "ZH_HANT_TW",
}

impl Collation {
    pub fn from_code(code: &str) -> Option<Collation> {
        let code = code.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code().eq_ignore_ascii_case(code))
    }

    pub fn is_case_insensitive(self) -> bool {
        self.code().contains("_CI")
    }

    /// Built-in SQLite collating sequence closest to this collation.
    pub fn sqlite_collation(self) -> &'static str {
        if self.is_case_insensitive() {
            "NOCASE"
        } else {
            "BINARY"
        }
    }
}

impl Default for Collation {
    fn default() -> Self {
        Collation::Binary
    }
}

/// Best-effort lookup: unknown codes yield `None` and are ignored by callers.
pub fn resolve_collation(code: Option<&str>) -> Option<Collation> {
    code.and_then(Collation::from_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_codes() {
        assert_eq!(resolve_collation(Some("EN_US_CI")), Some(Collation::EnUsCi));
        assert_eq!(resolve_collation(Some("de")), Some(Collation::De));
        assert_eq!(Collation::ALL.len(), 43);
    }

    #[test]
    fn test_unknown_code_is_ignored() {
        assert_eq!(resolve_collation(Some("KLINGON")), None);
        assert_eq!(resolve_collation(None), None);
    }

    #[test]
    fn test_sqlite_mapping() {
        assert_eq!(Collation::FrFrCiAi.sqlite_collation(), "NOCASE");
        assert_eq!(Collation::JaJis.sqlite_collation(), "BINARY");
        assert_eq!(Collation::default(), Collation::Binary);
    }
}
