//! Page extractors for Projudi HTML.

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html};

use crate::models::MovementRecord;
use crate::portal::{normalize_text, selector, stripped_text, AdapterError};
use crate::processo::CaseNumber;

const AUTH_ONCLICK_PREFIX: &str = "document.location.href='/projudi/autenticacao.do";

/// Names of inputs that carry the one-time code on the 2FA prompt.
const OTP_FIELD_HINTS: [&str; 3] = ["otp", "token", "codigo"];

/// Login form fields (`username`, `password`) present on the page.
pub fn is_login_page(html: &str) -> bool {
    let document = Html::parse_document(html);
    selector("input[type=\"password\"]")
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false)
}

/// Name of the input that expects a TOTP code, when the page is a 2FA prompt.
pub fn otp_field(html: &str) -> Result<Option<String>, AdapterError> {
    let document = Html::parse_document(html);
    let input_selector = selector("form input")?;

    Ok(document.select(&input_selector).find_map(|input| {
        let name = input.value().attr("name")?;
        let kind = input.value().attr("type").unwrap_or("text").to_ascii_lowercase();
        let lowered = name.to_ascii_lowercase();
        let is_code = matches!(kind.as_str(), "text" | "number" | "tel")
            && OTP_FIELD_HINTS.iter().any(|hint| lowered.contains(hint));
        is_code.then(|| name.to_string())
    }))
}

/// The authenticated home lists the external-area entries.
pub fn is_authenticated(html: &str) -> bool {
    html.contains("logout") || html.contains(AUTH_ONCLICK_PREFIX)
}

/// Link to the authenticated area found in the home page's `li.externo` items.
pub fn authenticated_area_link(html: &str) -> Result<Option<String>, AdapterError> {
    let document = Html::parse_document(html);
    let li_selector = selector("li.externo")?;

    Ok(document.select(&li_selector).find_map(|li| {
        let onclick = li.value().attr("onclick")?;
        if !onclick.starts_with(AUTH_ONCLICK_PREFIX) {
            return None;
        }
        let link = onclick.split("href='").nth(1)?.split("';").next()?;
        Some(link.trim_end_matches('\'').to_string())
    }))
}

/// Link to the first-instance case search.
pub fn search_link(html: &str) -> Result<String, AdapterError> {
    let document = Html::parse_document(html);
    let link_selector = selector("a[title^=\"Busca por processos de 1\"]")?;
    document
        .select(&link_selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
        .ok_or_else(|| AdapterError::MalformedPage("link de busca de processos ausente".to_string()))
}

/// Link to the case page in the search results, if the case was found.
pub fn case_link(html: &str) -> Result<Option<String>, AdapterError> {
    let document = Html::parse_document(html);
    let link_selector = selector("a[href^=\"/projudi/processo.do?_tj=\"]")?;
    Ok(document
        .select(&link_selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string))
}

/// Parses the movements tab (`table.resultTable`).
pub fn parse_movements(html: &str, processo: &CaseNumber) -> Result<Vec<MovementRecord>, AdapterError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table.resultTable")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| AdapterError::MalformedPage("tabela de movimentações ausente".to_string()))?;

    let mut records = Vec::new();
    for row in table.select(&row_selector) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        if cells.len() < 5 {
            continue;
        }

        let (usuario, tipo) = split_actor(&cells[4]);
        records.push(MovementRecord {
            processo: processo.formatted(),
            evento: stripped_text(&cells[1]),
            data: format_date(&first_line(&cells[2])),
            descricao: normalize_text(&cells[3].text().collect::<String>()),
            usuario,
            tipo,
            ..MovementRecord::default()
        });
    }

    if records.is_empty() {
        records.push(MovementRecord::placeholder(processo));
    }
    Ok(records)
}

fn first_line(cell: &ElementRef<'_>) -> String {
    let text: String = cell.text().collect();
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// "Movimentado por" cell: user and role separated by the first double space.
fn split_actor(cell: &ElementRef<'_>) -> (String, String) {
    let text: String = cell
        .text()
        .collect::<String>()
        .trim()
        .replace(['\t', '\r'], "")
        .replace('\n', " ");

    match text.split_once("  ") {
        Some((usuario, tipo)) => (normalize_text(usuario), normalize_text(tipo).to_uppercase()),
        None => (normalize_text(&text), String::new()),
    }
}

fn format_date(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.format("%d-%m-%Y").to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVEMENTS_PAGE: &str = r#"
        <html><body>
        <table class="resultTable">
            <tr><th></th><th>Seq.</th><th>Data</th><th>Evento</th><th>Movimentado Por</th></tr>
            <tr>
                <td><a href="/projudi/processo/movimentacaoArquivoDocumento.do?_tj=abc">+</a></td>
                <td> 45 </td>
                <td>2024-03-05 14:22:10.0
                    <br>há 2 dias</td>
                <td>  JUNTADA DE
                    PETIÇÃO DE   Manifestação </td>
                <td>MARIA SILVA  Advogado</td>
            </tr>
            <tr>
                <td></td>
                <td>44</td>
                <td>2024-02-28 09:00:00.123</td>
                <td>Conclusos para decisão</td>
                <td>SISTEMA</td>
            </tr>
            <tr><td colspan="5">Nenhum arquivo</td></tr>
        </table>
        </body></html>
    "#;

    fn processo() -> CaseNumber {
        CaseNumber::normalize("0001234-56.2023.8.16.0001")
    }

    #[test]
    fn test_parse_movements() {
        let records = parse_movements(MOVEMENTS_PAGE, &processo()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.processo, "0001234-56.2023.8.16.0001");
        assert_eq!(first.evento, "45");
        assert_eq!(first.data, "05-03-2024");
        assert_eq!(first.descricao, "JUNTADA DE PETIÇÃO DE Manifestação");
        assert_eq!(first.usuario, "MARIA SILVA");
        assert_eq!(first.tipo, "ADVOGADO");
        assert_eq!(first.arquivos, None);

        let second = &records[1];
        assert_eq!(second.data, "28-02-2024");
        assert_eq!(second.usuario, "SISTEMA");
        assert_eq!(second.tipo, "");
    }

    #[test]
    fn test_empty_table_yields_placeholder() {
        let html = r#"<table class="resultTable"><tr><th>Seq.</th></tr></table>"#;
        let records = parse_movements(html, &processo()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_placeholder());
    }

    #[test]
    fn test_missing_table_is_malformed() {
        let err = parse_movements("<html><p>Sessão expirada</p></html>", &processo()).unwrap_err();
        assert!(matches!(err, AdapterError::MalformedPage(_)));
    }

    #[test]
    fn test_authenticated_area_link() {
        let html = r#"
            <ul>
                <li class="externo" onclick="window.open('https://www.tjpr.jus.br')">Portal</li>
                <li class="externo" onclick="document.location.href='/projudi/autenticacao.do?_tj=9f1e';">Advogado</li>
            </ul>
        "#;
        assert_eq!(
            authenticated_area_link(html).unwrap().as_deref(),
            Some("/projudi/autenticacao.do?_tj=9f1e")
        );
        assert_eq!(authenticated_area_link("<ul></ul>").unwrap(), None);
    }

    #[test]
    fn test_search_and_case_links() {
        let html = r#"
            <a title="Busca por processos de 1º Grau" href="/projudi/processo/buscaProcessosQualquerInstancia.do">Buscar</a>
            <a href="/projudi/processo.do?_tj=77aa">0001234-56.2023.8.16.0001</a>
        "#;
        assert_eq!(
            search_link(html).unwrap(),
            "/projudi/processo/buscaProcessosQualquerInstancia.do"
        );
        assert_eq!(
            case_link(html).unwrap().as_deref(),
            Some("/projudi/processo.do?_tj=77aa")
        );
        assert_eq!(case_link("<p>Nenhum registro encontrado</p>").unwrap(), None);
        assert!(search_link("<p></p>").is_err());
    }

    #[test]
    fn test_login_and_otp_detection() {
        let login = r#"<form action="/projudi/login.do"><input name="username"><input type="password" name="password"></form>"#;
        assert!(is_login_page(login));
        assert_eq!(otp_field(login).unwrap(), None);

        let otp = r#"<form action="/projudi/autenticacaoDoisFatores.do"><input type="hidden" name="_tj" value="1"><input type="text" name="codigoOtp"></form>"#;
        assert!(!is_login_page(otp));
        assert_eq!(otp_field(otp).unwrap().as_deref(), Some("codigoOtp"));
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-03-05 14:22:10.0"), "05-03-2024");
        assert_eq!(format_date("ontem"), "ontem");
    }
}
