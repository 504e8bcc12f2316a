use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qr_share_core::{CLOSE_PAYLOAD, HEARTBEAT_PAYLOAD};
use qrcode::{render::svg, QrCode};
use thiserror::Error;

/// Rendered QR code size in pixels.
const QR_MIN_DIMENSION: u32 = 300;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to encode URL into a QR code: {0}")]
    QrCode(#[from] qrcode::types::QrError),
}

/// Encodes `url` as an SVG QR code wrapped in a `data:` URL for an `<img>` tag.
pub fn qr_data_url(url: &str) -> Result<String, RenderError> {
    let code = QrCode::new(url.as_bytes())?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .build();
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(image.as_bytes())
    ))
}

/// Builds the status page: the QR code, the plain URL, and the script that keeps
/// this page registered as a viewer while it stays open.
pub fn render_status_page(
    file_name: &str,
    download_url: &str,
    heartbeat_interval: Duration,
) -> Result<String, RenderError> {
    let qr = qr_data_url(download_url)?;
    let file_name = escape_html(file_name);
    let url = escape_html(download_url);
    let heartbeat_ms = heartbeat_interval.as_millis();

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>QR Share - {file_name}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            display: flex;
            flex-direction: column;
            align-items: center;
            justify-content: center;
            height: 100vh;
            margin: 0;
            background-color: #f0f0f0;
        }}
        .container {{
            text-align: center;
            padding: 20px;
            background-color: white;
            border-radius: 10px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
            max-width: 600px;
            width: 90%;
        }}
        img {{ max-width: 300px; margin: 20px 0; }}
        .url {{
            word-break: break-all;
            margin: 10px 0;
            padding: 10px;
            background-color: #f8f8f8;
            border-radius: 5px;
            font-family: monospace;
        }}
        #status {{ color: #666; margin-top: 10px; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Scan to download {file_name}</h2>
        <img src="{qr}" alt="QR code for {url}">
        <p class="url">{url}</p>
        <p id="status">Server running. Close this window when you are done sharing.</p>
    </div>
    <script>
        const statusLine = document.getElementById('status');
        const scheme = window.location.protocol === 'https:' ? 'wss://' : 'ws://';
        const ws = new WebSocket(scheme + window.location.host + '/ws');
        const beat = setInterval(() => {{
            if (ws.readyState === WebSocket.OPEN) {{
                ws.send('{heartbeat}');
            }}
        }}, {heartbeat_ms});
        ws.addEventListener('close', () => {{
            clearInterval(beat);
            statusLine.textContent = 'Sharing has ended. You can close this window.';
        }});
        window.addEventListener('beforeunload', () => {{
            if (ws.readyState === WebSocket.OPEN) {{
                ws.send('{close}');
            }}
        }});
    </script>
</body>
</html>
"#,
        heartbeat = HEARTBEAT_PAYLOAD,
        close = CLOSE_PAYLOAD,
    ))
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn qr_is_an_svg_data_url() {
        let data_url = qr_data_url("http://192.168.1.20:3000/a.txt").unwrap();
        let encoded = data_url
            .strip_prefix("data:image/svg+xml;base64,")
            .unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test_timeout::timeout]
    fn page_embeds_url_and_heartbeat_interval() {
        let page = render_status_page(
            "a.txt",
            "http://192.168.1.20:3000/a.txt",
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(page.contains("Scan to download a.txt"));
        assert!(page.contains("<p class=\"url\">http://192.168.1.20:3000/a.txt</p>"));
        assert!(page.contains("}, 5000);"));
        assert!(page.contains("ws.send('heartbeat')"));
        assert!(page.contains("ws.send('close')"));
        assert!(page.contains("'/ws'"));
    }

    #[test_timeout::timeout]
    fn page_escapes_file_name() {
        let page = render_status_page(
            "<script>alert(1)</script>.txt",
            "http://10.0.0.2:3000/x",
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;.txt"));
    }

    #[test_timeout::timeout]
    fn escape_html_handles_all_specials() {
        assert_eq!(escape_html(r#"a&b<c>"d"'e"#), "a&amp;b&lt;c&gt;&quot;d&quot;&#39;e");
    }
}
