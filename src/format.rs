use time::{format_description, Date};

pub const RUPEE: &str = "₹";
/// Prefix used where the output font has no glyph for the rupee sign.
pub const RUPEE_ASCII: &str = "Rs.";

pub fn sanitize_filename(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | ' ' => ch,
            _ => '_',
        })
        .collect();
    match cleaned.trim() {
        "" => "document".to_string(),
        name => name.to_string(),
    }
}

/// Thousands-grouped amount with at most two decimals and no trailing zeros
/// (`5000` -> `5,000`, `1234.5` -> `1,234.5`).
pub fn format_amount(v: f64) -> String {
    let v = if v.is_finite() { v } else { 0.0 };
    let s = format!("{:.2}", v.abs());
    let parts = s.split('.').collect::<Vec<_>>();
    let int_part = parts[0];
    let dec_part = parts.get(1).copied().unwrap_or("00").trim_end_matches('0');

    let mut out = String::new();
    let chars: Vec<char> = int_part.chars().collect();
    let mut cnt = 0;
    for i in (0..chars.len()).rev() {
        if cnt == 3 {
            out.push(',');
            cnt = 0;
        }
        out.push(chars[i]);
        cnt += 1;
    }
    let int_with_sep: String = out.chars().rev().collect();
    let sign = if v < 0.0 && s != "0.00" { "-" } else { "" };
    if dec_part.is_empty() {
        format!("{}{}", sign, int_with_sep)
    } else {
        format!("{}{}.{}", sign, int_with_sep, dec_part)
    }
}

pub fn format_money(v: f64) -> String {
    format!("{}{}", RUPEE, format_amount(v))
}

pub fn format_money_ascii(v: f64) -> String {
    format!("{} {}", RUPEE_ASCII, format_amount(v))
}

pub fn escape_html(input: &str) -> String {
    fn entity(ch: char) -> Option<&'static str> {
        Some(match ch {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            '"' => "&quot;",
            '\'' => "&#39;",
            _ => return None,
        })
    }
    input.chars().fold(String::with_capacity(input.len()), |mut out, ch| {
        match entity(ch) {
            Some(e) => out.push_str(e),
            None => out.push(ch),
        }
        out
    })
}

/// `YYYY-MM-DD` rendered as `DD/MM/YYYY`; anything unparsable is shown as typed.
pub fn display_date(ymd: &str) -> String {
    let raw = ymd.trim();
    let parsed = format_description::parse("[year]-[month]-[day]")
        .ok()
        .and_then(|fmt| Date::parse(raw, &fmt).ok());
    let Some(date) = parsed else {
        return raw.to_string();
    };
    format!("{:02}/{:02}/{:04}", date.day(), u8::from(date.month()), date.year())
}
