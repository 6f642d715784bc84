//! Contract shared by the court portal clients.
//!
//! A portal adapter turns a case number into movement records. How it gets
//! there (logins, captchas, 2FA prompts, page hops) is its own business; the
//! batch only relies on [`PortalAdapter::execute`] returning records or a
//! typed [`AdapterError`].

pub mod captcha_solver;
pub mod form;
pub mod retry;
pub mod totp;

use futures::future::BoxFuture;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::models::MovementRecord;
use crate::processo::CaseNumber;

/// User agent sent by every portal session.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The portal answered that the case does not exist there.
    #[error("Processo {0} não encontrado")]
    CaseNotFound(String),
    #[error("Falha ao resolver captcha: {0}")]
    CaptchaResolution(String),
    #[error("Falha na autenticação em dois fatores: {0}")]
    TwoFactor(String),
    #[error("Falha no login: {0}")]
    Login(String),
    /// The page came back without the structure the parser expects.
    #[error("Página inesperada: {0}")]
    MalformedPage(String),
    #[error("Erro no serviço de captcha: {0}")]
    Solver(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AdapterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AdapterError::CaseNotFound(_))
    }
}

/// One court portal the batch can query.
///
/// Implementations keep their authenticated session internally, so `execute`
/// takes `&self` and can run inside a spawned task through an `Arc`.
pub trait PortalAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches every movement of `processo`.
    ///
    /// Returns a single placeholder record when the case exists but has no
    /// movements, and [`AdapterError::CaseNotFound`] when the portal does not
    /// know the case at all.
    fn execute<'a>(
        &'a self,
        processo: &'a CaseNumber,
    ) -> BoxFuture<'a, Result<Vec<MovementRecord>, AdapterError>>;
}

/// Parses a literal CSS selector, reporting failures as a malformed page.
pub(crate) fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::MalformedPage(format!("seletor {}: {:?}", css, e)))
}

/// Collapses runs of whitespace to single spaces and NFC-normalizes the text.
pub fn normalize_text(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of an element with each text node trimmed and concatenated.
pub(crate) fn stripped_text(element: &ElementRef<'_>) -> String {
    let joined: String = element.text().map(str::trim).collect();
    normalize_text(&joined)
}

/// Joins a relative link from a page onto the portal base URL.
pub(crate) fn join_url(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            link.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        assert_eq!(
            normalize_text("  Juntada\t de\r\n  petição  "),
            "Juntada de petição"
        );
    }

    #[test]
    fn test_normalize_text_composes_accents() {
        let decomposed = "peti\u{0063}\u{0327}a\u{0303}o";
        assert_eq!(normalize_text(decomposed), "petição");
    }

    #[test]
    fn test_stripped_text() {
        let html = Html::parse_fragment(
            "<table><tr><td>  <b> 12 </b>\n <i>abc</i> </td></tr></table>",
        );
        let td = html
            .select(&selector("td").unwrap())
            .next()
            .unwrap();
        assert_eq!(stripped_text(&td), "12abc");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://eproc1g.tjrs.jus.br/eproc", "controlador.php?acao=x"),
            "https://eproc1g.tjrs.jus.br/eproc/controlador.php?acao=x"
        );
        assert_eq!(
            join_url("https://projudi.tjpr.jus.br/", "/projudi/home.do"),
            "https://projudi.tjpr.jus.br/projudi/home.do"
        );
        assert_eq!(
            join_url("https://a.example", "https://b.example/x"),
            "https://b.example/x"
        );
    }

    #[test]
    fn test_not_found_is_distinguished() {
        assert!(AdapterError::CaseNotFound("1".into()).is_not_found());
        assert!(!AdapterError::Login("x".into()).is_not_found());
    }
}
