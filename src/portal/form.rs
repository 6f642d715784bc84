use scraper::{ElementRef, Html};

use super::{selector, AdapterError};

/// A parsed HTML form: where it posts and the fields it would send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlForm {
    pub action: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl HtmlForm {
    /// First `<form>` of the page.
    pub fn first(html: &str) -> Result<Self, AdapterError> {
        Self::select(html, "form")
    }

    /// First form matching `css`.
    pub fn select(html: &str, css: &str) -> Result<Self, AdapterError> {
        let document = Html::parse_document(html);
        let form_selector = selector(css)?;
        let form = document
            .select(&form_selector)
            .next()
            .ok_or_else(|| AdapterError::MalformedPage(format!("formulário '{}' ausente", css)))?;
        Self::from_element(&form)
    }

    fn from_element(form: &ElementRef<'_>) -> Result<Self, AdapterError> {
        let input_selector = selector("input, select, textarea")?;
        let mut fields = Vec::new();

        for input in form.select(&input_selector) {
            let attrs = input.value();
            // eproc forms identify fields by id, Projudi ones by name
            let Some(key) = attrs.attr("name").or_else(|| attrs.attr("id")) else {
                continue;
            };
            let kind = attrs.attr("type").unwrap_or("text").to_ascii_lowercase();
            if matches!(kind.as_str(), "submit" | "button" | "image" | "reset" | "file") {
                continue;
            }
            if matches!(kind.as_str(), "checkbox" | "radio") && attrs.attr("checked").is_none() {
                continue;
            }
            let value = match attrs.name() {
                "textarea" => input.text().collect::<String>(),
                "select" => selected_option(&input)?,
                _ => attrs.attr("value").unwrap_or_default().to_string(),
            };
            fields.push((key.to_string(), value));
        }

        Ok(Self {
            action: form.value().attr("action").map(str::to_string),
            fields,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a field, replacing an existing value or appending a new one.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some(field) => field.1 = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn action_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.action.as_deref().filter(|a| !a.is_empty()).unwrap_or(fallback)
    }
}

fn selected_option(select: &ElementRef<'_>) -> Result<String, AdapterError> {
    let option_selector = selector("option")?;
    let mut options = select.select(&option_selector);
    let chosen = select
        .select(&option_selector)
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| options.next());
    Ok(chosen
        .map(|o| {
            o.value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| o.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default())
}
