//! Client for the Projudi regional portal.

pub mod html_parser;

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Url};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::PortalCredentials;
use crate::models::MovementRecord;
use crate::portal::form::HtmlForm;
use crate::portal::retry::RetryPolicy;
use crate::portal::{join_url, totp, AdapterError, PortalAdapter, USER_AGENT};
use crate::processo::CaseNumber;

const LABEL: &str = "PROJUDI";
const HOME_PATH: &str = "/projudi/home.do";
const LOGIN_PATH: &str = "/projudi/";
const MOVEMENTS_TAB: &str = "tabMovimentacoesProcesso";
const HTTP_TIMEOUT_SECS: u64 = 60;

pub struct ProjudiClient {
    base_url: String,
    credentials: PortalCredentials,
    login_retry: RetryPolicy,
    /// `None` after a failed query; the next case logs in again.
    session: Mutex<Option<Client>>,
}

impl ProjudiClient {
    /// Logs in right away; exhausting the retry policy is an error for the caller.
    pub async fn connect(
        base_url: impl Into<String>,
        credentials: PortalCredentials,
        login_retry: RetryPolicy,
    ) -> Result<Self, AdapterError> {
        let client = Self {
            base_url: base_url.into(),
            credentials,
            login_retry,
            session: Mutex::new(None),
        };
        let http = client.login_with_retry().await?;
        *client.session.lock().await = Some(http);
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Resolves a link relative to the page it was found on.
    fn resolve(&self, page_url: &str, link: &str) -> String {
        Url::parse(page_url)
            .and_then(|page| page.join(link))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.url(link))
    }

    fn build_http() -> Result<Client, AdapterError> {
        Ok(Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .use_rustls_tls()
            .build()?)
    }

    async fn get(http: &Client, url: &str) -> Result<String, AdapterError> {
        debug!("GET {}", url);
        Ok(http.get(url).send().await?.text().await?)
    }

    async fn submit(http: &Client, url: &str, form: &HtmlForm) -> Result<String, AdapterError> {
        debug!("POST {}", url);
        Ok(http.post(url).form(&form.fields).send().await?.text().await?)
    }

    async fn login_with_retry(&self) -> Result<Client, AdapterError> {
        let label = format!("[{}] login", LABEL);
        self.login_retry
            .run(&label, |_| self.login())
            .await
            .map_err(|e| AdapterError::Login(e.to_string()))
    }

    async fn login(&self) -> Result<Client, AdapterError> {
        info!(
            "[{}] Iniciando login para o usuário: {}",
            LABEL, self.credentials.username
        );
        let http = Self::build_http()?;

        let login_url = self.url(LOGIN_PATH);
        let login_page = Self::get(&http, &login_url).await?;
        let mut form = HtmlForm::first(&login_page)?;
        form.set("username", self.credentials.username.as_str());
        form.set("password", self.credentials.password.as_str());
        let target = self.resolve(&login_url, form.action_or(LOGIN_PATH));
        let mut page = Self::submit(&http, &target, &form).await?;

        if let Some(field) = html_parser::otp_field(&page)? {
            info!("[{}] 2FA requerido. Enviando código TOTP.", LABEL);
            let mut otp_form = HtmlForm::first(&page)?;
            otp_form.set(&field, totp::now(&self.credentials.totp_secret)?);
            let otp_target = self.resolve(&target, otp_form.action_or(&target));
            page = Self::submit(&http, &otp_target, &otp_form).await?;
            if html_parser::otp_field(&page)?.is_some() {
                return Err(AdapterError::TwoFactor(
                    "código recusado pelo portal".to_string(),
                ));
            }
        }

        if html_parser::is_login_page(&page) {
            return Err(AdapterError::Login("credenciais recusadas".to_string()));
        }

        let home = Self::get(&http, &self.url(HOME_PATH)).await?;
        if !html_parser::is_authenticated(&home) {
            return Err(AdapterError::Login(
                "página inicial não reconheceu a sessão".to_string(),
            ));
        }

        info!("✅ [{}] Sessão no projudi iniciada com sucesso.", LABEL);
        Ok(http)
    }

    async fn fetch_movements_page(
        &self,
        http: &Client,
        processo: &CaseNumber,
    ) -> Result<String, AdapterError> {
        let home_url = self.url(HOME_PATH);
        let home = Self::get(http, &home_url).await?;
        let area = html_parser::authenticated_area_link(&home)?.ok_or_else(|| {
            AdapterError::MalformedPage("acesso à área autenticada ausente".to_string())
        })?;

        let area_url = self.resolve(&home_url, &area);
        let area_page = Self::get(http, &area_url).await?;
        let search_url = self.resolve(&area_url, &html_parser::search_link(&area_page)?);

        let search_page = Self::get(http, &search_url).await?;
        let search_form = case_search_form(&search_page, processo)?;
        let results_url = self.resolve(&search_url, search_form.action_or(&search_url));
        let results = Self::submit(http, &results_url, &search_form).await?;

        let case_link = html_parser::case_link(&results)?
            .ok_or_else(|| AdapterError::CaseNotFound(processo.formatted()))?;
        let case_url = self.resolve(&results_url, &case_link);
        let case_page = Self::get(http, &case_url).await?;

        let mut tab_form = HtmlForm::first(&case_page)?;
        tab_form.set("selectedIcon", MOVEMENTS_TAB);
        let tab_url = self.resolve(&case_url, tab_form.action_or(&case_url));
        Self::submit(http, &tab_url, &tab_form).await
    }

    async fn query(&self, processo: &CaseNumber) -> Result<Vec<MovementRecord>, AdapterError> {
        info!("[{}] Consultando processo {}...", LABEL, processo);

        let mut guard = self.session.lock().await;
        let http = match guard.take() {
            Some(http) => http,
            None => self.login_with_retry().await?,
        };

        let result = match self.fetch_movements_page(&http, processo).await {
            Ok(page) => html_parser::parse_movements(&page, processo),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => *guard = Some(http),
            Err(e) if e.is_not_found() => {
                info!("[{}] {}", LABEL, e);
                *guard = Some(http);
            }
            Err(e) => {
                warn!(
                    "[{}] Ocorreu um erro ao buscar movimentações do processo {}: {}",
                    LABEL, processo, e
                );
            }
        }

        result
    }
}

/// Search form of the "Busca por processos" page filled with the bare
/// 20-digit number, the form the portal accepts.
fn case_search_form(page: &str, processo: &CaseNumber) -> Result<HtmlForm, AdapterError> {
    let mut form = HtmlForm::first(page)?;
    form.set("numeroProcesso", processo.digits());
    Ok(form)
}

impl PortalAdapter for ProjudiClient {
    fn name(&self) -> &str {
        "Projudi"
    }

    fn execute<'a>(
        &'a self,
        processo: &'a CaseNumber,
    ) -> BoxFuture<'a, Result<Vec<MovementRecord>, AdapterError>> {
        Box::pin(self.query(processo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_form_sends_bare_digits() {
        let page = r#"
            <form action="/projudi/buscas/ProcessosParte.do" method="post">
                <input type="hidden" name="_tj" value="a1b2">
                <input type="text" name="numeroProcesso" value="">
                <input type="submit" name="pesquisar" value="Pesquisar">
            </form>
        "#;
        let processo = CaseNumber::normalize("0001234-56.2023.8.16.0001");

        let form = case_search_form(page, &processo).unwrap();

        assert_eq!(form.get("numeroProcesso"), Some("00012345620238160001"));
        assert_eq!(form.get("_tj"), Some("a1b2"));
        assert_eq!(form.action.as_deref(), Some("/projudi/buscas/ProcessosParte.do"));
    }
}
