use scraper::{Html, Selector};
use url::Url;

use crate::error::Error;

/// Form action used when the callback form carries none.
pub(crate) const DEFAULT_FORM_ACTION: &str = "/login/callback";

/// How the credential submission handed back the authorization code.
#[derive(Debug)]
pub(crate) enum CodeSource {
    /// `Location` header already carried `code`.
    Redirect(String),
    /// An auto-submitting HTML form that must be replayed to reach the code.
    Form(CallbackForm),
}

/// The first `<form>` of a login response, ready to be resubmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackForm {
    pub(crate) action: Url,
    pub(crate) fields: Vec<(String, String)>,
}

impl CallbackForm {
    /// Parses the first form in `html`, resolving its action against `base`.
    ///
    /// Inputs without a `name` are skipped; a missing `value` becomes "".
    pub(crate) fn parse(html: &str, base: &Url) -> Result<Self, Error> {
        let form_selector = selector("form")?;
        let input_selector = selector("input")?;

        let document = Html::parse_document(html);
        let form = document
            .select(&form_selector)
            .next()
            .ok_or_else(|| Error::Authentication("no callback form in login response".into()))?;

        let action = form
            .value()
            .attr("action")
            .map(str::trim)
            .filter(|action| !action.is_empty())
            .unwrap_or(DEFAULT_FORM_ACTION);
        let action = base.join(action)?;

        let fields = form
            .select(&input_selector)
            .filter_map(|input| {
                let name = input.value().attr("name").filter(|n| !n.is_empty())?;
                let value = input.value().attr("value").unwrap_or_default();
                Some((name.to_owned(), value.to_owned()))
            })
            .collect();

        Ok(Self { action, fields })
    }
}

fn selector(css: &str) -> Result<Selector, Error> {
    Selector::parse(css)
        .map_err(|e| Error::Authentication(format!("invalid selector `{css}`: {e}")))
}

/// Non-empty `code` query parameter of a redirect target.
pub(crate) fn code_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, value)| key == "code" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Resolves a `Location` header against the authorization host.
pub(crate) fn redirect_target(
    response: &reqwest::Response,
    base: &Url,
) -> Result<Option<Url>, Error> {
    let Some(location) = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };
    Ok(Some(base.join(location)?))
}
