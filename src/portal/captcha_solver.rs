use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::AdapterError;

const DEFAULT_BASE_URL: &str = "https://2captcha.com";

/// 2Captcha API client used for image captchas and Cloudflare Turnstile.
pub struct CaptchaSolver {
    api_key: String,
    base_url: String,
    client: Client,
    poll_interval: Duration,
    max_polls: u32,
}

impl CaptchaSolver {
    /// Create a new captcha solver with API key
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
            poll_interval: Duration::from_secs(2),
            max_polls: 60, // 2 minutes max
        }
    }

    /// Solve an image captcha given its base64 payload (no `data:` prefix).
    pub async fn solve_image_base64(&self, image_base64: &str) -> Result<String, AdapterError> {
        info!("🤖 Solving image captcha using 2Captcha API...");

        let response = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(&[
                ("key", self.api_key.as_str()),
                ("method", "base64"),
                ("body", image_base64),
            ])
            .send()
            .await?;
        let text = response.text().await?;

        let captcha_id = parse_ok_payload(&text)
            .ok_or_else(|| AdapterError::Solver(format!("Failed to submit captcha: {}", text)))?;
        info!("Captcha submitted, ID: {}", captcha_id);

        self.poll_result(captcha_id).await
    }

    /// Solve a Cloudflare Turnstile challenge.
    pub async fn solve_turnstile(&self, site_key: &str, page_url: &str) -> Result<String, AdapterError> {
        info!("🤖 Solving Turnstile using 2Captcha API...");

        let submit_url = format!(
            "{}/in.php?key={}&method=turnstile&sitekey={}&pageurl={}",
            self.base_url,
            self.api_key,
            urlencoding::encode(site_key),
            urlencoding::encode(page_url)
        );

        debug!("Submitting Turnstile to 2Captcha...");
        let response = self.client.get(&submit_url).send().await?;
        let text = response.text().await?;

        let captcha_id = parse_ok_payload(&text)
            .ok_or_else(|| AdapterError::Solver(format!("Failed to submit captcha: {}", text)))?;
        info!("Turnstile submitted, ID: {}", captcha_id);

        self.poll_result(captcha_id).await
    }

    async fn poll_result(&self, captcha_id: &str) -> Result<String, AdapterError> {
        for attempt in 1..=self.max_polls {
            sleep(self.poll_interval).await;

            let result_url = format!(
                "{}/res.php?key={}&action=get&id={}",
                self.base_url, self.api_key, captcha_id
            );

            let response = self.client.get(&result_url).send().await?;
            let text = response.text().await?;

            if let Some(solution) = parse_ok_payload(&text) {
                info!(
                    "✅ Captcha solved successfully! (attempt {}/{})",
                    attempt, self.max_polls
                );
                return Ok(solution.to_string());
            } else if text == "CAPCHA_NOT_READY" {
                debug!(
                    "Captcha not ready yet, waiting... (attempt {}/{})",
                    attempt, self.max_polls
                );
            } else if text.starts_with("ERROR_") {
                return Err(AdapterError::Solver(text));
            } else {
                warn!("Unexpected response from 2Captcha: {}", text);
            }
        }

        Err(AdapterError::Solver(
            "Timeout waiting for captcha solution".to_string(),
        ))
    }

    /// Get site key from page HTML
    pub fn extract_site_key(html: &str) -> Option<String> {
        // Pattern: data-sitekey="XXXX"
        if let Some(start) = html.find("data-sitekey=\"") {
            let start_idx = start + 14;
            if let Some(end) = html[start_idx..].find('"') {
                return Some(html[start_idx..start_idx + end].to_string());
            }
        }

        // Alternative pattern: turnstile.render('#el', { sitekey: 'SITE_KEY' })
        if let Some(start) = html.find("sitekey: '") {
            let start_idx = start + 10;
            if let Some(end) = html[start_idx..].find('\'') {
                return Some(html[start_idx..start_idx + end].to_string());
            }
        }

        None
    }
}

/// Payload of a `OK|<payload>` answer.
fn parse_ok_payload(text: &str) -> Option<&str> {
    text.trim().strip_prefix("OK|").filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_site_key() {
        let html = r#"<div class="cf-turnstile" data-sitekey="0x4AAAAAAATest"></div>"#;
        let site_key = CaptchaSolver::extract_site_key(html);
        assert_eq!(site_key, Some("0x4AAAAAAATest".to_string()));
    }

    #[test]
    fn test_extract_site_key_alternative() {
        let html = r#"turnstile.render('#cf', { sitekey: '0x4AAAAAAAlt' });"#;
        let site_key = CaptchaSolver::extract_site_key(html);
        assert_eq!(site_key, Some("0x4AAAAAAAlt".to_string()));
    }

    #[test]
    fn test_extract_site_key_missing() {
        assert_eq!(CaptchaSolver::extract_site_key("<div></div>"), None);
    }

    #[test]
    fn test_parse_ok_payload() {
        assert_eq!(parse_ok_payload("OK|12345"), Some("12345"));
        assert_eq!(parse_ok_payload("OK|x7k2\n"), Some("x7k2"));
        assert_eq!(parse_ok_payload("OK|"), None);
        assert_eq!(parse_ok_payload("CAPCHA_NOT_READY"), None);
        assert_eq!(parse_ok_payload("ERROR_ZERO_BALANCE"), None);
    }
}
