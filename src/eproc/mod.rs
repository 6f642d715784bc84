//! Client for the multi-tenant eproc system (one instance per tenant).

pub mod html_parser;

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::PortalCredentials;
use crate::models::MovementRecord;
use crate::portal::captcha_solver::CaptchaSolver;
use crate::portal::form::HtmlForm;
use crate::portal::retry::RetryPolicy;
use crate::portal::{join_url, totp, AdapterError, PortalAdapter, USER_AGENT};
use crate::processo::CaseNumber;

const SEARCH_MENU_LABEL: &str = "Consultar Processos";
const CAPTCHA_ATTEMPTS: u32 = 5;
/// Captcha/2FA pages chained during one login before giving up.
const MAX_CHALLENGE_ROUNDS: u32 = 6;
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Authenticated state kept between cases.
struct EprocSession {
    http: Client,
    menu: HashMap<String, String>,
}

/// eproc tenant client.
pub struct EprocClient {
    label: String,
    base_url: String,
    credentials: PortalCredentials,
    solver: CaptchaSolver,
    login_retry: RetryPolicy,
    captcha_retry: RetryPolicy,
    session: Mutex<Option<EprocSession>>,
}

impl EprocClient {
    /// Builds the client; login happens lazily on the first case.
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        credentials: PortalCredentials,
        solver: CaptchaSolver,
        login_retry: RetryPolicy,
    ) -> Self {
        Self {
            label: label.into(),
            base_url: base_url.into(),
            credentials,
            solver,
            login_retry,
            captcha_retry: RetryPolicy::immediate(CAPTCHA_ATTEMPTS),
            session: Mutex::new(None),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    fn build_http() -> Result<Client, AdapterError> {
        Ok(Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .use_rustls_tls()
            .build()?)
    }

    async fn post_form(
        http: &Client,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<String, AdapterError> {
        debug!("POST {}", url);
        Ok(http.post(url).form(fields).send().await?.text().await?)
    }

    async fn get(http: &Client, url: &str) -> Result<String, AdapterError> {
        debug!("GET {}", url);
        Ok(http.get(url).send().await?.text().await?)
    }

    async fn login_with_retry(&self) -> Result<EprocSession, AdapterError> {
        let label = format!("[{}] login", self.label);
        self.login_retry
            .run(&label, |_| self.login())
            .await
            .map_err(|e| AdapterError::Login(e.to_string()))
    }

    async fn login(&self) -> Result<EprocSession, AdapterError> {
        info!(
            "[{}] Iniciando login para o usuário: {}",
            self.label, self.credentials.username
        );
        let http = Self::build_http()?;

        let fields = vec![
            ("txtUsuario".to_string(), self.credentials.username.clone()),
            ("pwdSenha".to_string(), self.credentials.password.clone()),
            ("hdnAcao".to_string(), "login".to_string()),
            ("hdnDebug".to_string(), String::new()),
        ];
        let mut html = Self::post_form(&http, &self.url("index.php"), &fields).await?;

        let mut rounds = 0;
        while html_parser::requires_captcha(&html) || html_parser::requires_2fa(&html) {
            rounds += 1;
            if rounds > MAX_CHALLENGE_ROUNDS {
                return Err(AdapterError::Login(
                    "portal continua exigindo captcha/2FA".to_string(),
                ));
            }
            if html_parser::requires_captcha(&html) {
                info!("[{}] Captcha detectado. Iniciando resolução.", self.label);
                html = self.resolve_captcha(&http, &html).await?;
            }
            if html_parser::requires_2fa(&html) {
                info!("[{}] 2FA requerido. Iniciando validação.", self.label);
                html = self.resolve_2fa(&http, &html).await?;
            }
        }

        if let Some(profile_id) = html_parser::user_profile_id(&html, &self.credentials.username)? {
            debug!("[{}] Selecionando perfil {}", self.label, profile_id);
            let url = self.url(&format!(
                "controlador.php?acao=pessoa_usuario_logar&acao_origem=entrar&id_usuario={}",
                profile_id
            ));
            let fields = vec![("lista_processos".to_string(), String::new())];
            html = Self::post_form(&http, &url, &fields).await?;
        }

        let menu = html_parser::menu_links(&html)?;
        if !menu.contains_key(SEARCH_MENU_LABEL) {
            return Err(AdapterError::Login(format!(
                "menu '{}' ausente após login",
                SEARCH_MENU_LABEL
            )));
        }

        info!(
            "✅ [{}] Login concluído com sucesso para o usuário: {}",
            self.label, self.credentials.username
        );
        Ok(EprocSession { http, menu })
    }

    async fn resolve_2fa(&self, http: &Client, html: &str) -> Result<String, AdapterError> {
        let mut form = HtmlForm::first(html)?;
        form.set("txtAcessoCodigo", totp::now(&self.credentials.totp_secret)?);
        let response = Self::post_form(http, &self.url("index.php"), &form.fields).await?;
        if html_parser::requires_2fa(&response) {
            return Err(AdapterError::TwoFactor(
                "código recusado pelo portal".to_string(),
            ));
        }
        Ok(response)
    }

    async fn resolve_captcha(&self, http: &Client, html: &str) -> Result<String, AdapterError> {
        if html_parser::is_cloudflare_captcha(html) {
            self.resolve_turnstile(http, html).await
        } else {
            self.resolve_image_captcha(http, html).await
        }
    }

    async fn resolve_turnstile(&self, http: &Client, html: &str) -> Result<String, AdapterError> {
        info!("[{}] Detectado captcha da Cloudflare. Iniciando resolução...", self.label);
        let site_key = html_parser::turnstile_site_key(html)?;
        let action = HtmlForm::first(html)
            .ok()
            .and_then(|f| f.action)
            .unwrap_or_else(|| "index.php".to_string());
        let label = format!("[{}] captcha Turnstile", self.label);
        let (site_key, action) = (site_key.as_str(), action.as_str());

        self.captcha_retry
            .run(&label, |_| {
                async move {
                    let token = self.solver.solve_turnstile(site_key, &self.base_url).await?;
                    let fields = vec![("cf-turnstile-response".to_string(), token)];
                    let response = Self::post_form(http, &self.url(action), &fields).await?;
                    if html_parser::captcha_accepted(&response) {
                        info!("✅ [{}] Captcha resolvido com sucesso.", self.label);
                        Ok(response)
                    } else {
                        Err(AdapterError::CaptchaResolution(
                            "validação do Turnstile falhou".to_string(),
                        ))
                    }
                }
            })
            .await
            .map_err(|e| AdapterError::CaptchaResolution(e.to_string()))
    }

    async fn resolve_image_captcha(&self, http: &Client, html: &str) -> Result<String, AdapterError> {
        let page_slot = Mutex::new(html.to_string());
        let current = &page_slot;
        let label = format!("[{}] captcha de imagem", self.label);

        self.captcha_retry
            .run(&label, |_| {
                async move {
                    let mut page = current.lock().await;
                    if !html_parser::requires_captcha(&page) {
                        return Ok(page.clone());
                    }

                    let image = html_parser::captcha_image_base64(&page)?;
                    let text = self.solver.solve_image_base64(&image).await?;
                    let mut form = HtmlForm::first(&page)?;
                    form.set("txtInfraCaptcha", text);
                    let action = form.action_or("index.php").to_string();
                    let response = Self::post_form(http, &self.url(&action), &form.fields).await?;

                    if html_parser::requires_captcha(&response) {
                        *page = response;
                        Err(AdapterError::CaptchaResolution(
                            "captcha recusado pelo portal".to_string(),
                        ))
                    } else {
                        Ok(response)
                    }
                }
            })
            .await
            .map_err(|e| AdapterError::CaptchaResolution(e.to_string()))
    }

    async fn fetch_case_page(
        &self,
        session: &EprocSession,
        processo: &CaseNumber,
    ) -> Result<String, AdapterError> {
        let http = &session.http;
        let search_link = session.menu.get(SEARCH_MENU_LABEL).ok_or_else(|| {
            AdapterError::MalformedPage(format!("menu '{}' ausente", SEARCH_MENU_LABEL))
        })?;

        let search_page = Self::get(http, &self.url(search_link)).await?;
        let endpoint = html_parser::search_endpoint(&search_page)?;

        let fields: Vec<(String, String)> = [
            ("hdnInfraTipoPagina", "1"),
            ("acao_origem", "consultar"),
            ("acao_retorno", ""),
            ("acao", "processo_consultar"),
            ("hdnNumPaginaAtual", "1"),
            ("hdnNumSentidoNavegacao", "1"),
            ("hdnNumIdProcessoCursorInicio", ""),
            ("hdnNumIdProcessoCursorFim", ""),
            ("hdnNumIdProcessoCursorIniciosAnteriores", ""),
            ("tipoPesquisa", "NU"),
            ("numNrProcesso", processo.digits()),
            ("selIdClasseSelecionados", ""),
            ("strChave", ""),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let response = Self::post_form(http, &self.url(&endpoint), &fields).await?;
        if html_parser::case_not_found(&response) {
            return Err(AdapterError::CaseNotFound(processo.formatted()));
        }

        let case_link = html_parser::case_link(&response)?;
        let mut page = Self::get(http, &self.url(&case_link)).await?;

        if html_parser::requires_full_access(&page) {
            debug!("[{}] Acessando íntegra do processo {}", self.label, processo);
            let endpoint = html_parser::full_access_endpoint(&page)?;
            page = Self::get(http, &self.url(&endpoint)).await?;
            if html_parser::requires_2fa(&page) {
                page = self.resolve_2fa(http, &page).await?;
            }
            if html_parser::requires_captcha(&page) {
                page = self.resolve_captcha(http, &page).await?;
            }
        }

        Ok(page)
    }

    async fn query(&self, processo: &CaseNumber) -> Result<Vec<MovementRecord>, AdapterError> {
        info!("[{}] Consultando processo {}...", self.label, processo);

        let mut guard = self.session.lock().await;
        let session = match guard.take() {
            Some(session) => session,
            None => self.login_with_retry().await?,
        };

        let result = match self.fetch_case_page(&session, processo).await {
            Ok(page) => html_parser::parse_movements(&page, processo),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => *guard = Some(session),
            Err(e) if e.is_not_found() => {
                info!("[{}] {}", self.label, e);
                *guard = Some(session);
            }
            Err(e) => {
                warn!(
                    "[{}] Erro ao consultar processo {}: {}. Sessão descartada.",
                    self.label, processo, e
                );
            }
        }

        result
    }
}

impl PortalAdapter for EprocClient {
    fn name(&self) -> &str {
        &self.label
    }

    fn execute<'a>(
        &'a self,
        processo: &'a CaseNumber,
    ) -> BoxFuture<'a, Result<Vec<MovementRecord>, AdapterError>> {
        Box::pin(self.query(processo))
    }
}
