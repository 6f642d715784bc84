//! Page recognizers and extractors for eproc HTML.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::Deserialize;

use crate::models::MovementRecord;
use crate::portal::captcha_solver::CaptchaSolver;
use crate::portal::{normalize_text, selector, stripped_text, AdapterError};
use crate::processo::CaseNumber;

const TWO_FACTOR_MARKER: &str = "Informe o código de 6 dígitos gerado";
const NOT_FOUND_MARKER: &str = "Processo não encontrado";
const FULL_ACCESS_MARKER: &str = "Acesso íntegra do processo";
const ACCESS_GRANTED_MARKER: &str = "ACESSO LIBERADO";

pub fn requires_2fa(html: &str) -> bool {
    html.contains(TWO_FACTOR_MARKER)
}

pub fn requires_captcha(html: &str) -> bool {
    has_element(html, "div#divInfraCaptcha") || is_cloudflare_captcha(html)
}

pub fn is_cloudflare_captcha(html: &str) -> bool {
    has_element(html, "div#challenge-stage") || html.to_lowercase().contains("cloudflare")
}

pub fn captcha_accepted(html: &str) -> bool {
    html.to_uppercase().contains(ACCESS_GRANTED_MARKER)
}

pub fn case_not_found(html: &str) -> bool {
    html.contains(NOT_FOUND_MARKER)
}

pub fn requires_full_access(html: &str) -> bool {
    html.contains(FULL_ACCESS_MARKER)
}

fn has_element(html: &str, css: &str) -> bool {
    let document = Html::parse_document(html);
    selector(css)
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false)
}

/// Base64 payload of the image inside `div#divInfraCaptcha`.
pub fn captcha_image_base64(html: &str) -> Result<String, AdapterError> {
    let document = Html::parse_document(html);
    let img_selector = selector("div#divInfraCaptcha label img")?;
    let src = document
        .select(&img_selector)
        .next()
        .and_then(|img| img.value().attr("src"))
        .ok_or_else(|| {
            AdapterError::CaptchaResolution("imagem do captcha não encontrada no HTML".to_string())
        })?;

    let payload = match src.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:image") => data,
        _ => src,
    };
    Ok(payload.trim().to_string())
}

/// Site key of the Cloudflare Turnstile widget.
pub fn turnstile_site_key(html: &str) -> Result<String, AdapterError> {
    let document = Html::parse_document(html);
    let widget_selector = selector("div.cf-turnstile")?;
    document
        .select(&widget_selector)
        .next()
        .and_then(|div| div.value().attr("data-sitekey"))
        .map(str::to_string)
        .or_else(|| CaptchaSolver::extract_site_key(html))
        .ok_or_else(|| {
            AdapterError::CaptchaResolution("sitekey do Turnstile não encontrado".to_string())
        })
}

/// Profile id from the profile picker, or `None` when the portal logged the
/// user straight in.
pub fn user_profile_id(html: &str, username: &str) -> Result<Option<String>, AdapterError> {
    if html.to_lowercase().contains("usuário logado como") {
        return Ok(None);
    }

    let document = Html::parse_document(html);
    let button_selector = selector("button[data-descricao]")?;
    let expected = format!("{} / ADVOGADO", username);
    let Some(onclick) = document
        .select(&button_selector)
        .find(|b| b.value().attr("data-descricao") == Some(expected.as_str()))
        .and_then(|b| b.value().attr("onclick"))
    else {
        return Ok(None);
    };

    let digits = pattern(r"[0-9]+")?;
    Ok(digits.find(onclick).map(|m| m.as_str().to_string()))
}

/// Side menu entries after login, label → href.
pub fn menu_links(html: &str) -> Result<HashMap<String, String>, AdapterError> {
    let document = Html::parse_document(html);
    let ul_selector = selector("ul")?;
    let anchor_selector = selector("a")?;
    let span_selector = selector("span")?;

    let ul = document
        .select(&ul_selector)
        .next()
        .ok_or_else(|| AdapterError::MalformedPage("menu lateral ausente".to_string()))?;

    let mut links = HashMap::new();
    for anchor in ul.select(&anchor_selector) {
        let (Some(span), Some(href)) = (
            anchor.select(&span_selector).next(),
            anchor.value().attr("href"),
        ) else {
            continue;
        };
        links.insert(stripped_text(&span), href.to_string());
    }
    Ok(links)
}

/// AJAX endpoint the case search form posts to (hash changes per login).
pub fn search_endpoint(html: &str) -> Result<String, AdapterError> {
    first_match(
        html,
        r"controlador_ajax\.php\?acao_ajax=processos_consulta_por_numprocesso&hash=[a-z0-9]+",
        "endpoint da consulta processual",
    )
}

pub fn full_access_endpoint(html: &str) -> Result<String, AdapterError> {
    first_match(
        html,
        r"controlador\.php\?acao=processo_vista_sem_procuracao&txtNumProcesso=[0-9a-z]+&hash=[0-9a-z]+",
        "link de acesso à íntegra",
    )
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    resultados: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "linkProcessoAssinado")]
    link_processo_assinado: String,
}

/// Signed link of the first search hit in the AJAX JSON response.
pub fn case_link(json: &str) -> Result<String, AdapterError> {
    let response: SearchResponse = serde_json::from_str(json)
        .map_err(|e| AdapterError::MalformedPage(format!("resposta da consulta: {}", e)))?;
    response
        .resultados
        .into_iter()
        .next()
        .map(|r| r.link_processo_assinado)
        .ok_or_else(|| AdapterError::MalformedPage("consulta sem resultados".to_string()))
}

/// Events table (`table#tblEventos`) of a case page.
///
/// A table without qualifying rows yields the placeholder record; a page
/// without the table at all is reported as malformed.
pub fn parse_movements(html: &str, processo: &CaseNumber) -> Result<Vec<MovementRecord>, AdapterError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table#tblEventos")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let table = document.select(&table_selector).next().ok_or_else(|| {
        AdapterError::MalformedPage("tabela de eventos não encontrada".to_string())
    })?;

    let mut movements = Vec::new();
    for row in table.select(&row_selector).skip(1) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < 5 {
            continue;
        }

        let data_hora = stripped_text(&cells[1]);
        let (usuario, tipo) = user_info(&cells[3])?;

        movements.push(MovementRecord {
            processo: processo.formatted(),
            evento: stripped_text(&cells[0]),
            data: format_date(&data_hora),
            descricao: stripped_text(&cells[2]),
            usuario,
            tipo: tipo.to_uppercase(),
            ..MovementRecord::default()
        });
    }

    if movements.is_empty() {
        movements.push(MovementRecord::placeholder(processo));
    }
    Ok(movements)
}

fn user_info(cell: &ElementRef<'_>) -> Result<(String, String), AdapterError> {
    let sr_only = selector("span.sr-only")?;
    let label_selector = selector("label.infraEventoUsuario")?;

    let lines: Vec<String> = if let Some(span) = cell.select(&sr_only).next() {
        span.text()
            .map(normalize_text)
            .filter(|s| !s.is_empty())
            .collect()
    } else if let Some(onmouseover) = cell
        .select(&label_selector)
        .next()
        .and_then(|l| l.value().attr("onmouseover"))
    {
        let tooltip = pattern(r"carregarInfoUsuarioOutroGrau\('(.+?)'\)")?;
        tooltip
            .captures(onmouseover)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().split("<br/>").map(normalize_text).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let mut lines = lines.into_iter();
    let usuario = lines.next().unwrap_or_default();
    let tipo = lines.next().unwrap_or_default();
    Ok((usuario, tipo))
}

/// `dd/mm/yyyy HH:MM:SS` → `dd-mm-yyyy`; unparseable text passes through.
fn format_date(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw.trim(), "%d/%m/%Y %H:%M:%S")
        .map(|dt| dt.format("%d-%m-%Y").to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}

fn pattern(re: &str) -> Result<Regex, AdapterError> {
    Regex::new(re).map_err(|e| AdapterError::MalformedPage(format!("regex {}: {}", re, e)))
}

fn first_match(html: &str, re: &str, what: &str) -> Result<String, AdapterError> {
    pattern(re)?
        .find(html)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AdapterError::MalformedPage(format!("{} não encontrado", what)))
}
