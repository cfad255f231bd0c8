//! Human-facing rendering of a lead: the mail subject and an HTML body
//! with a field table followed by the raw ADF document for auditing.

use super::{LeadEvent, LeadMeta};
use crate::utils::escape_markup as esc;

pub fn subject(event: &LeadEvent) -> String {
    format!(
        "New Service-to-Sales Lead: {} — {}",
        event.prospect_name(),
        event.vehicle()
    )
    .trim_end_matches([' ', '—'])
    .to_string()
}

fn row(label: &str, value: &str) -> String {
    format!(
        r#"<tr><td style="padding:4px 12px 4px 0;color:#6b7280;white-space:nowrap;">{}</td><td style="padding:4px 0;color:#111827;">{}</td></tr>"#,
        esc(label),
        esc(value)
    )
}

pub fn render_html(event: &LeadEvent, meta: &LeadMeta, xml: &str) -> String {
    let mut rows = vec![
        row("Customer", &event.prospect_name()),
        row("Phone", event.phone.as_deref().unwrap_or("N/A")),
        row("Email", event.email.as_deref().unwrap_or("N/A")),
    ];
    rows.extend(
        event
            .summary()
            .iter()
            .map(|(label, value)| row(label, value)),
    );

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body style="font-family:-apple-system,'Segoe UI',Roboto,Arial,sans-serif;margin:0;padding:20px;background:#f5f5f5;">
<div style="max-width:640px;margin:0 auto;background:#ffffff;border-radius:8px;padding:24px;">
<h2 style="margin:0 0 4px;">{title}</h2>
<p style="margin:0 0 16px;color:#6b7280;">{lead_id} · {request_date} · {vendor}</p>
<table style="border-collapse:collapse;font-size:14px;">
{rows}
</table>
<h3 style="margin:24px 0 8px;">ADF/XML</h3>
<pre style="font-family:monospace;font-size:12px;background:#f3f4f6;padding:12px;overflow-x:auto;">{xml}</pre>
</div>
</body>
</html>"#,
        title = esc(&subject(event)),
        lead_id = esc(&meta.lead_id),
        request_date = esc(&meta.request_date),
        vendor = esc(&meta.vendor_name),
        rows = rows.join("\n"),
        xml = esc(xml),
    )
}
