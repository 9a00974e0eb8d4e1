//! HTML rendering of the prediction form and its two result states.

use std::fmt::Write as _;

use vinoq_quality::{
    features::field, FeatureField, InputError, Verdict, FEATURE_COUNT, FEATURE_FIELDS,
};

/// Static page settings.
#[derive(Debug, Clone)]
pub struct PageSettings {
    /// Page title and heading.
    pub title: String,
    /// Whether `/banner` serves an image.
    pub banner: bool,
}

/// What to render below the form.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Successful prediction.
    Verdict(Verdict),
    /// A field failed the range check.
    Rejected(InputError),
    /// The service could not produce a prediction.
    Failed(String),
}

/// Raw field texts echoed back into the inputs, in field-table order.
#[derive(Debug, Clone)]
pub struct FormValues([String; FEATURE_COUNT]);

impl Default for FormValues {
    fn default() -> Self {
        Self(FEATURE_FIELDS.map(|field| field.default.to_string()))
    }
}

impl FormValues {
    /// Takes the submitted text for each known field, falling back to its default.
    #[must_use]
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut values = Self::default();
        for (name, value) in pairs {
            if let Some(idx) = FEATURE_FIELDS.iter().position(|field| field.name == name) {
                values.0[idx].clone_from(value);
            }
        }
        values
    }
}

const STYLE: &str = "\
body{margin:0;min-height:100vh;background:linear-gradient(to bottom right,#2E0249,#570A57,#A91079);\
color:#fff;font-family:'Poppins',sans-serif}\
main{max-width:760px;margin:0 auto;padding:32px 16px}\
h1,h2,h3{color:#F9F9F9;text-align:center;font-weight:700}\
.subtitle{text-align:center;color:#EAEAEA;font-size:18px}\
.banner{text-align:center}\
.grid{display:grid;grid-template-columns:1fr 1fr;gap:12px 24px}\
label{display:block;font-size:15px;margin-bottom:4px}\
input{width:100%;box-sizing:border-box;border-radius:10px;padding:10px;font-size:16px;border:none}\
button{margin-top:20px;background:#D91656;color:#fff;border-radius:12px;height:3em;width:100%;\
font-size:18px;font-weight:bold;border:1px solid #FFB6C1;transition:.3s;cursor:pointer}\
button:hover{background:#FF6B81;color:#000;transform:scale(1.02)}\
.result{border-radius:12px;padding:14px 18px;margin-top:8px;font-size:18px}\
.good{background:rgba(0,255,178,.18);border:1px solid #00FFB2}\
.low,.error{background:rgba(255,80,80,.18);border:1px solid #FF6B81}\
.remark{text-align:center;font-size:18px}\
.remark.good-text{color:#00FFB2}.remark.low-text{color:#FFC3A0}\
footer{text-align:center;color:#DDD;font-size:14px;margin-top:30px}";

/// Renders the full page.
#[must_use]
pub fn render(settings: &PageSettings, values: &FormValues, outcome: Option<&Outcome>) -> String {
    let title = escape(&settings.title);
    let mut html = String::with_capacity(8 * 1024);
    let _ = write!(
        html,
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title}</title><style>{STYLE}</style></head><body><main>\
         <h1>{title}</h1>\
         <p class=\"subtitle\">Predict wine quality using Machine Learning \
         and real chemical data</p>"
    );
    if settings.banner {
        html.push_str(
            "<div class=\"banner\"><img src=\"/banner\" width=\"400\" alt=\"wine\"></div>",
        );
    }
    html.push_str(
        "<h3>Enter Wine Chemical Properties:</h3>\
         <form method=\"post\" action=\"/predict\"><div class=\"grid\">",
    );
    // first six fields fill the left column, the rest the right one
    for column in [0..6, 6..FEATURE_COUNT] {
        html.push_str("<div>");
        for idx in column {
            render_input(&mut html, &FEATURE_FIELDS[idx], &values.0[idx]);
        }
        html.push_str("</div>");
    }
    html.push_str("</div><button type=\"submit\">Predict Wine Quality</button></form>");
    if let Some(outcome) = outcome {
        html.push_str("<hr><h3>Prediction Result:</h3>");
        render_outcome(&mut html, outcome);
    }
    html.push_str(
        "<hr><footer>Vinoq | Powered by Machine Learning<br>\
         #AI #DataScience #WineQualityPrediction</footer></main></body></html>",
    );
    html
}

fn render_input(html: &mut String, field: &FeatureField, value: &str) {
    let _ = write!(
        html,
        "<label for=\"{name}\">{label}</label>\
         <input id=\"{name}\" name=\"{name}\" type=\"number\" required \
         min=\"{min}\" max=\"{max}\" step=\"{step}\" value=\"{value}\">",
        name = field.name,
        label = field.label,
        min = field.min,
        max = field.max,
        step = field.step,
        value = escape(value),
    );
}

fn render_outcome(html: &mut String, outcome: &Outcome) {
    match outcome {
        Outcome::Verdict(verdict) => {
            let (class, text_class) = if verdict.is_good() {
                ("good", "good-text")
            } else {
                ("low", "low-text")
            };
            let _ = write!(
                html,
                "<div class=\"result {class}\">This wine is <b>{headline}</b> \
                 (Confidence: {confidence})</div>\
                 <p class=\"remark {text_class}\">{remark}</p>",
                headline = verdict.headline(),
                confidence = verdict.confidence_text(),
                remark = verdict.remark(),
            );
        }
        Outcome::Rejected(err) => {
            let label = field(err.field()).map_or(err.field(), |field| field.label);
            let _ = write!(
                html,
                "<div class=\"result error\">Please check <b>{}</b>: {}</div>",
                escape(label),
                escape(&err.to_string()),
            );
        }
        Outcome::Failed(reason) => {
            let _ = write!(
                html,
                "<div class=\"result error\"><b>Prediction failed.</b> {}</div>",
                escape(reason),
            );
        }
    }
}

/// Escapes text for HTML element and attribute content.
#[must_use]
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
