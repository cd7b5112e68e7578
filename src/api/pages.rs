// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User-facing HTML pages. Rendering is deliberately plain string
//! assembly; everything interpolated into markup goes through
//! [`escape_html`] first.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::error::CheckInError;

/// Entry page: shows the current QR code. The image endpoint issues a
/// fresh token on every render, so reloading the page is enough to get a
/// new code.
pub async fn index() -> Html<String> {
    Html(page(
        "Attendance check-in",
        r#"<p>Scan the QR code with your phone to check in.</p>
<img src="/qr_image.png" alt="check-in QR code" width="240" height="240">
<p><a href="/">Refresh the code</a></p>"#,
    ))
}

/// Location-confirmation step for origins the access policy does not
/// trust: ask the browser for coordinates, submit them with the token,
/// then follow the redirect the server hands back.
pub fn location_gate_page(token: &str) -> Html<String> {
    let token = escape_html(token);
    let body = format!(
        r#"<p>Confirm you are in the room to continue checking in.</p>
<button id="confirm">Confirm my location</button>
<p id="status"></p>
<script>
const status = document.getElementById("status");
document.getElementById("confirm").addEventListener("click", () => {{
  if (!navigator.geolocation) {{
    status.textContent = "This browser cannot report a location.";
    return;
  }}
  status.textContent = "Checking your location…";
  navigator.geolocation.getCurrentPosition(async (pos) => {{
    const res = await fetch("/verify_location", {{
      method: "POST",
      headers: {{ "Content-Type": "application/json" }},
      body: JSON.stringify({{
        token: "{token}",
        latitude: pos.coords.latitude,
        longitude: pos.coords.longitude
      }})
    }});
    const out = await res.json();
    if (out.success) {{
      window.location = out.redirect_url;
    }} else {{
      status.textContent = out.message || out.error || "Location check failed.";
    }}
  }}, () => {{
    status.textContent = "Location access was denied.";
  }});
}});
</script>"#
    );
    Html(page("Confirm your location", &body))
}

/// Rendered after the ledger row is written.
pub fn success_page(display_name: &str) -> Html<String> {
    let name = escape_html(display_name);
    Html(page(
        "Check-in complete",
        &format!("<p>Welcome, {name}. Your attendance has been recorded.</p><p>You can close this page.</p>"),
    ))
}

/// Render a check-in failure as an HTML page with the error's status.
pub fn error_page(err: &CheckInError) -> Response {
    let body = format!("<p>{}</p><p><a href=\"/\">Back to the QR code</a></p>", escape_html(&err.to_string()));
    (err.status_code(), Html(page("Check-in failed", &body))).into_response()
}

/// Render an internal failure without leaking its cause.
pub fn internal_error_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(page(
            "Check-in failed",
            "<p>Something went wrong on our side. Please try again.</p>",
        )),
    )
        .into_response()
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 28rem; margin: 3rem auto; padding: 0 1rem; text-align: center; }}
button {{ font-size: 1rem; padding: 0.6rem 1.2rem; }}
</style>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>"#
    )
}

fn escape_html(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            other => other.to_string(),
        })
        .collect()
}
