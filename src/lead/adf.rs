//! ADF/XML 1.0 lead documents.
//!
//! The document is assembled by templating; every interpolated value is
//! escaped. Phone and email elements are left out when absent, every other
//! element is always present and may be empty.

use super::{LeadEvent, LeadMeta};
use crate::utils::escape_markup as esc;

fn text(value: &Option<String>) -> String {
    value.as_deref().map(esc).unwrap_or_default()
}

/// Free-text block shown verbatim to whoever opens the lead in the CRM.
pub fn comments(event: &LeadEvent, meta: &LeadMeta) -> String {
    let mut out = format!("SERVICE DRIVE LEAD — {} S2S\n", meta.provider_name);
    for (label, value) in event.summary() {
        if label == "Rep Notes" {
            out.push('\n');
        }
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
    out
}

pub fn render_xml(event: &LeadEvent, meta: &LeadMeta) -> String {
    let mut contact = format!(
        "        <name part=\"full\">{}</name>\n",
        esc(&event.prospect_name())
    );
    if let Some(phone) = event.phone.as_deref() {
        contact.push_str(&format!(
            "        <phone type=\"voice\" time=\"{}\">{}</phone>\n",
            esc(event.best_time.as_deref().unwrap_or("nopreference")),
            esc(phone)
        ));
    }
    if let Some(email) = event.email.as_deref() {
        contact.push_str(&format!("        <email>{}</email>\n", esc(email)));
    }

    let vendor_contact = event
        .submitter
        .as_deref()
        .unwrap_or(meta.provider_name.as_str());

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<?adf version="1.0"?>
<adf>
  <prospect status="new">
    <id sequence="1" source="{provider}">{lead_id}</id>
    <requestdate>{request_date}</requestdate>
    <vehicle interest="buy" status="used">
      <year>{year}</year>
      <make>{make}</make>
      <model>{model}</model>
      <trim>{trim}</trim>
      <odometer units="mi">{miles}</odometer>
    </vehicle>
    <customer>
      <contact primarycontact="1">
{contact}      </contact>
      <comments>{comments}</comments>
    </customer>
    <vendor>
      <vendorname>{vendor}</vendorname>
      <contact>
        <name part="full">{vendor_contact}</name>
      </contact>
    </vendor>
    <provider>
      <name>{provider}</name>
      <service>{service}</service>
      <url>{url}</url>
    </provider>
    <source>{source}</source>
  </prospect>
</adf>
"#,
        provider = esc(&meta.provider_name),
        lead_id = esc(&meta.lead_id),
        request_date = esc(&meta.request_date),
        year = text(&event.veh_year),
        make = text(&event.veh_make),
        model = text(&event.veh_model),
        trim = text(&event.veh_trim),
        miles = text(&event.veh_miles),
        contact = contact,
        comments = esc(&comments(event, meta)),
        vendor = esc(&meta.vendor_name),
        vendor_contact = esc(vendor_contact),
        service = esc(&meta.provider_service),
        url = esc(&meta.provider_url),
        source = esc(&meta.source),
    )
}
