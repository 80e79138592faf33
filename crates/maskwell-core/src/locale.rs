//! Input language detection, used when localization has no explicit target

use tracing::debug;
use whatlang::Lang;

/// Two-letter locale of the language `text` is written in.
///
/// `None` when the text has no script to go on, the guess is unreliable, or
/// the language has no two-letter code below.
pub fn detect_locale(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        debug!(lang = info.lang().code(), confidence = info.confidence(), "unreliable language guess");
        return None;
    }
    iso_639_1(info.lang()).map(str::to_string)
}

fn iso_639_1(lang: Lang) -> Option<&'static str> {
    let code = match lang {
        Lang::Eng => "en",
        Lang::Fra => "fr",
        Lang::Spa => "es",
        Lang::Deu => "de",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Ces => "cs",
        Lang::Slk => "sk",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Nob => "nb",
        Lang::Fin => "fi",
        Lang::Hun => "hu",
        Lang::Ron => "ro",
        Lang::Ell => "el",
        Lang::Tur => "tr",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Hin => "hi",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        Lang::Vie => "vi",
        Lang::Ind => "id",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_common_languages() {
        assert_eq!(
            detect_locale(
                "Please send the signed contract to my colleague before the end of next week, \
                 and let me know when it has arrived."
            )
            .as_deref(),
            Some("en")
        );
        assert_eq!(
            detect_locale(
                "Merci d'envoyer le contrat signé à mon collègue avant la fin de la semaine \
                 prochaine, et de me prévenir quand il sera arrivé."
            )
            .as_deref(),
            Some("fr")
        );
    }

    #[test]
    fn test_undetermined_input() {
        assert_eq!(detect_locale(""), None);
        assert_eq!(detect_locale("+1234567890 555-010-2000"), None);
    }
}
