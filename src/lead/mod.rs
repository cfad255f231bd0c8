//! Service-to-sales leads and their CRM rendering.
//!
//! A [`LeadEvent`] is one submission of the service drive form. It is turned
//! into an ADF/XML document for the CRM's mail intake, plus an HTML email
//! that shows the same data to people.

pub mod adf;
pub mod render;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CrmConfig;
use crate::utils::lenient;

/// One form submission. Every field is optional and may arrive as a string
/// or a number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadEvent {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub veh_year: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub veh_make: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub veh_model: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub veh_trim: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub veh_miles: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub repair_cost: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub eng_score: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub outcome: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub notes: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub trade_interest: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub voi: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub submitter: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub contact_pref: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub best_time: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub cust_emotion: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub ro_num: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub svc_advisor: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub veh_ownership: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub trade_acv: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub voi_budget: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub timeline: Option<String>,
}

fn or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().unwrap_or(default)
}

fn dollars(value: &Option<String>) -> String {
    match value.as_deref() {
        Some(v) if v.starts_with('$') => v.to_string(),
        Some(v) => format!("${v}"),
        None => "N/A".to_string(),
    }
}

fn join_present(parts: &[&Option<String>]) -> String {
    parts
        .iter()
        .filter_map(|p| p.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

impl LeadEvent {
    /// Customer name as shown to the CRM; `Unknown` when no first name.
    pub fn prospect_name(&self) -> String {
        format!(
            "{} {}",
            or(&self.first_name, "Unknown"),
            or(&self.last_name, "")
        )
        .trim()
        .to_string()
    }

    /// Year, make and model, skipping blanks.
    pub fn vehicle(&self) -> String {
        join_present(&[&self.veh_year, &self.veh_make, &self.veh_model])
    }

    /// Labelled lines for every field without a dedicated ADF element.
    ///
    /// The CRM shows these verbatim in the comments block and the email
    /// repeats them as a table, so both read from here.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let vehicle = join_present(&[&self.veh_year, &self.veh_make, &self.veh_model, &self.veh_trim]);
        let current_vehicle = format!(
            "{} ({} mi)",
            if vehicle.is_empty() { "N/A" } else { vehicle.as_str() },
            or(&self.veh_miles, "N/A")
        );

        vec![
            ("Entry ID", or(&self.id, "N/A").to_string()),
            ("Rep", or(&self.submitter, "Unknown").to_string()),
            ("RO #", or(&self.ro_num, "N/A").to_string()),
            ("Service Advisor", or(&self.svc_advisor, "N/A").to_string()),
            ("Current Vehicle", current_vehicle),
            ("Ownership", or(&self.veh_ownership, "N/A").to_string()),
            ("Repair Cost", dollars(&self.repair_cost)),
            ("Engagement Score", format!("{}/10", or(&self.eng_score, "N/A"))),
            ("Customer Emotion", or(&self.cust_emotion, "N/A").to_string()),
            ("Trade Interest", or(&self.trade_interest, "N/A").to_string()),
            ("Trade ACV", dollars(&self.trade_acv)),
            ("VOI", or(&self.voi, "N/A").to_string()),
            ("Budget", or(&self.voi_budget, "N/A").to_string()),
            ("Timeline", or(&self.timeline, "N/A").to_string()),
            ("Contact Preference", or(&self.contact_pref, "N/A").to_string()),
            ("Best Time", or(&self.best_time, "N/A").to_string()),
            ("Outcome", or(&self.outcome, "N/A").to_string()),
            ("Rep Notes", or(&self.notes, "None").to_string()),
        ]
    }
}

/// Per-document values that are not part of the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadMeta {
    pub lead_id: String,
    /// `YYYY-MM-DD HH:MM:SS`, UTC
    pub request_date: String,
    pub vendor_name: String,
    pub provider_name: String,
    pub provider_service: String,
    pub provider_url: String,
    pub source: String,
}

impl LeadMeta {
    pub fn new(config: &CrmConfig, at: DateTime<Utc>) -> Self {
        Self {
            lead_id: format!("SB-{}", at.timestamp_millis()),
            request_date: at.format("%Y-%m-%d %H:%M:%S").to_string(),
            vendor_name: config.vendor_name.clone(),
            provider_name: config.provider_name.clone(),
            provider_service: config.provider_service.clone(),
            provider_url: config.provider_url.clone(),
            source: config.source.clone(),
        }
    }

    pub fn now(config: &CrmConfig) -> Self {
        Self::new(config, Utc::now())
    }
}

/// Everything needed to mail a lead to the CRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedLead {
    pub prospect_name: String,
    pub subject: String,
    pub xml: String,
    pub html: String,
    /// Plain-text part; the CRM parses the ADF document from it
    pub text: String,
}

/// Render a lead. Equal inputs give byte-identical output.
pub fn format(event: &LeadEvent, meta: &LeadMeta) -> FormattedLead {
    let xml = adf::render_xml(event, meta);
    let html = render::render_html(event, meta, &xml);
    FormattedLead {
        prospect_name: event.prospect_name(),
        subject: render::subject(event),
        text: xml.clone(),
        html,
        xml,
    }
}
