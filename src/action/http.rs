//! Discourse one-click unsubscribe over HTTP.
//!
//! Fetches the confirmation page, takes the first form on it, and submits
//! that form with its default values, the way a user clicking the button
//! would.

use super::UnsubscribeAction;
use crate::error::ActionError;
use reqwest::{Client, Method, Url};
use scraper::{ElementRef, Html};
use tracing::debug;

/// Client signature sent with every request.
pub const USER_AGENT: &str = concat!(
    "discourse_unsubscriber/",
    env!("CARGO_PKG_VERSION"),
    " (+",
    env!("CARGO_PKG_REPOSITORY"),
    ")"
);

/// Unsubscribes by submitting the confirmation form found at the target.
#[derive(Debug, Clone)]
pub struct HttpUnsubscriber {
    client: Client,
}

impl HttpUnsubscriber {
    /// Build the HTTP client. `verbose` turns on connection-level tracing.
    pub fn new(verbose: bool) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .connection_verbose(verbose)
            .build()?;
        Ok(Self { client })
    }
}

impl UnsubscribeAction for HttpUnsubscriber {
    async fn unsubscribe(&self, target: &str) -> Result<(), ActionError> {
        let url = Url::parse(target).map_err(|e| ActionError::InvalidUrl {
            url: target.to_string(),
            reason: e.to_string(),
        })?;

        debug!(%url, "fetching confirmation page");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| network(&url, source))?;
        let page_url = response.url().clone();
        let response = successful(response)?;
        let html = response
            .text()
            .await
            .map_err(|source| network(&page_url, source))?;

        let form = FormSubmission::first_in(&html, &page_url)?;
        debug!(
            action = %form.action,
            method = %form.method,
            fields = form.fields.len(),
            "submitting confirmation form"
        );

        let request = if form.method == Method::POST {
            self.client.post(form.action.clone()).form(&form.fields)
        } else {
            self.client.get(form.action.clone()).query(&form.fields)
        };
        let response = request
            .send()
            .await
            .map_err(|source| network(&form.action, source))?;
        let response = successful(response)?;
        debug!(status = %response.status(), url = %response.url(), "form accepted");
        Ok(())
    }
}

fn network(url: &Url, source: reqwest::Error) -> ActionError {
    ActionError::Network {
        url: url.to_string(),
        source,
    }
}

fn successful(response: reqwest::Response) -> Result<reqwest::Response, ActionError> {
    let status = response.status();
    debug!(%status, url = %response.url(), "response");
    if status.is_success() {
        Ok(response)
    } else {
        Err(ActionError::Status {
            url: response.url().to_string(),
            status,
        })
    }
}

/// The first form of a page, reduced to what a browser would send when its
/// first submit button is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub method: Method,
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// Locate the first `<form>` in `html` and collect its controls.
    ///
    /// Relative actions resolve against `page_url`; a missing or empty
    /// action submits back to the page itself.
    pub fn first_in(html: &str, page_url: &Url) -> Result<Self, ActionError> {
        let document = Html::parse_document(html);
        let form = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "form")
            .ok_or_else(|| ActionError::MissingForm {
                url: page_url.to_string(),
            })?;

        let method = match form.value().attr("method") {
            Some(m) if m.eq_ignore_ascii_case("post") => Method::POST,
            _ => Method::GET,
        };

        let action = match form.value().attr("action").map(str::trim) {
            None | Some("") => page_url.clone(),
            Some(action) => page_url
                .join(action)
                .map_err(|e| ActionError::InvalidUrl {
                    url: action.to_string(),
                    reason: e.to_string(),
                })?,
        };

        Ok(Self {
            method,
            action,
            fields: form_fields(form),
        })
    }
}

fn form_fields(form: ElementRef<'_>) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut submitter_taken = false;

    for control in form.descendants().filter_map(ElementRef::wrap) {
        let el = control.value();
        if el.attr("disabled").is_some() {
            continue;
        }
        let Some(name) = el.attr("name") else {
            continue;
        };

        match el.name() {
            "input" => {
                let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "checkbox" | "radio" => {
                        if el.attr("checked").is_some() {
                            fields.push((name.into(), el.attr("value").unwrap_or("on").into()));
                        }
                    }
                    "submit" => {
                        if !submitter_taken {
                            submitter_taken = true;
                            fields.push((name.into(), el.attr("value").unwrap_or("").into()));
                        }
                    }
                    "button" | "reset" | "image" | "file" => {}
                    _ => fields.push((name.into(), el.attr("value").unwrap_or("").into())),
                }
            }
            "button" => {
                let kind = el.attr("type").unwrap_or("submit");
                if kind.eq_ignore_ascii_case("submit") && !submitter_taken {
                    submitter_taken = true;
                    fields.push((name.into(), el.attr("value").unwrap_or("").into()));
                }
            }
            "textarea" => fields.push((name.into(), control.text().collect())),
            "select" => {
                let options: Vec<ElementRef<'_>> = control
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .filter(|o| o.value().name() == "option")
                    .collect();
                let chosen = options
                    .iter()
                    .find(|o| o.value().attr("selected").is_some())
                    .or_else(|| options.first());
                if let Some(option) = chosen {
                    let value = match option.value().attr("value") {
                        Some(v) => v.to_string(),
                        None => option.text().collect::<String>().trim().to_string(),
                    };
                    fields.push((name.into(), value));
                }
            }
            _ => {}
        }
    }

    fields
}
