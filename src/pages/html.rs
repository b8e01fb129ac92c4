//! Small HTML helpers shared by the pages.

/// Escape text for element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn alert(kind: &str, message: &str) -> String {
    format!("<div class=\"alert alert-{kind}\">{}</div>", escape(message))
}

/// Alert with one list item per error.
pub fn error_list(errors: &[String]) -> String {
    let items: String = errors
        .iter()
        .map(|e| format!("<li>{}</li>", escape(e)))
        .collect();
    format!("<div class=\"alert alert-danger\"><ul class=\"errorlist\">{items}</ul></div>")
}

pub fn login_form(action: &str) -> String {
    format!(
        concat!(
            "<form method=\"post\" action=\"{}\" class=\"form-login\">",
            "<label>Username <input type=\"text\" name=\"username\" value=\"admin\"></label>",
            "<label>Password <input type=\"password\" name=\"password\" autofocus></label>",
            "<button type=\"submit\">Login</button>",
            "</form>"
        ),
        escape(action)
    )
}

/// JavaScript string literal safe to place inside a `<script>` element.
fn script_string(text: &str) -> String {
    serde_json::Value::from(text).to_string().replace('<', "\\u003c")
}

/// Body that sends the client elsewhere (the console loads pages via script).
pub fn redirect(target: &str) -> String {
    let script_target = script_string(target);
    let target = escape(target);
    format!(
        "<meta http-equiv=\"refresh\" content=\"0; url={target}\">\
         <script>location.href={script_target};</script>\
         <p>Continue to <a href=\"{target}\">{target}</a></p>"
    )
}

pub fn panel(title: &str, body: &str) -> String {
    format!(
        "<div class=\"panel\"><div class=\"panel-heading\">{}</div><div class=\"panel-body\">{body}</div></div>",
        escape(title)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn login_form_posts_to_action() {
        let form = login_form("/cfg/password");
        assert!(form.contains("action=\"/cfg/password\""));
        assert!(form.contains("name=\"password\""));
    }

    #[test]
    fn redirect_encodes_target_per_context() {
        let body = redirect("/status?a=1&b='x'");
        assert!(body.contains("url=/status?a=1&amp;b=&#39;x&#39;\""));
        assert!(body.contains("<script>location.href=\"/status?a=1&b='x'\";</script>"));

        let body = redirect("/x\"</script><b>");
        assert!(body.contains("location.href=\"/x\\\"\\u003c/script>\\u003cb>\";"));
        assert_eq!(body.matches("</script>").count(), 1);
    }
}
