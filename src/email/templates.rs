use super::OutgoingEmail;

pub const RESET_SUBJECT: &str = "Reset Password Halo KAKA";

/// Builds the password-reset message. `reset_url` carries the plaintext token.
pub fn password_reset(recipient: &str, reset_url: &str, valid_minutes: i64) -> OutgoingEmail {
    let html_body = format!(
        r#"<div style="font-family: Arial, sans-serif; line-height: 1.6;">
  <h2>Halo KAKA password reset request</h2>
  <p>You are receiving this email because a password reset was requested for your account.</p>
  <p>Click the button below to continue. This link is only valid for {valid_minutes} minutes:</p>
  <a href="{reset_url}" style="background-color: #3486d9; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; display: inline-block;">
    Reset my password
  </a>
  <p>If you did not request this, you can safely ignore this email.</p>
  <hr>
  <p style="font-size: 0.9em; color: #777;">This email was sent automatically. Please do not reply.</p>
</div>"#,
        reset_url = html_escape(reset_url),
    );

    OutgoingEmail {
        recipient: recipient.to_string(),
        subject: RESET_SUBJECT.to_string(),
        html_body,
    }
}

fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
