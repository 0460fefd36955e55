use std::fmt;

use serde::{Deserialize, Serialize};

/// Element selector used for dApp and wallet affordances.
///
/// String form (as written in config files):
/// - `text=Connect Wallet` matches the visible element whose text is `Connect Wallet`
/// - `//button[...]`, `(//a)[2]` or `xpath=...` are XPath
/// - `css=...` or anything else is a CSS selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Selector {
    Css(String),
    XPath(String),
    Text(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Selector::Css(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Selector::Text(s.into())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let selector = if let Some(text) = trimmed.strip_prefix("text=") {
            Selector::Text(text.trim().to_string())
        } else if let Some(xpath) = trimmed.strip_prefix("xpath=") {
            Selector::XPath(xpath.trim().to_string())
        } else if trimmed.starts_with("//") || trimmed.starts_with("(//") {
            Selector::XPath(trimmed.to_string())
        } else if let Some(css) = trimmed.strip_prefix("css=") {
            Selector::Css(css.trim().to_string())
        } else {
            Selector::Css(trimmed.to_string())
        };
        Some(selector)
    }

    fn kind(&self) -> &'static str {
        match self {
            Selector::Css(_) => "css",
            Selector::XPath(_) => "xpath",
            Selector::Text(_) => "text",
        }
    }

    fn value(&self) -> &str {
        match self {
            Selector::Css(v) | Selector::XPath(v) | Selector::Text(v) => v,
        }
    }

    /// The selector as a JS object literal understood by `__wbFind`.
    fn js_arg(&self) -> String {
        serde_json::json!({ "kind": self.kind(), "value": self.value() }).to_string()
    }

    /// Expression: `true` when the element exists and is rendered visibly.
    pub fn visible_js(&self) -> String {
        [
            "(function() {",
            FIND_ELEMENT_JS,
            &format!("const el = __wbFind({});", self.js_arg()),
            "return !!el && __wbVisible(el);",
            "})()",
        ]
        .join("\n")
    }

    /// Expression: scrolls the element into view and returns its center, or null.
    pub fn center_point_js(&self) -> String {
        [
            "(function() {",
            FIND_ELEMENT_JS,
            &format!("const el = __wbFind({});", self.js_arg()),
            "if (!el || !__wbVisible(el)) return null;",
            "el.scrollIntoView({ behavior: 'instant', block: 'center', inline: 'center' });",
            "const rect = el.getBoundingClientRect();",
            "return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };",
            "})()",
        ]
        .join("\n")
    }

    /// Expression: sets the value through the native setter so framework-managed
    /// inputs observe the change. Returns `false` when nothing matched.
    pub fn fill_js(&self, text: &str) -> String {
        let text_json = serde_json::Value::String(text.to_string()).to_string();
        [
            "(function() {",
            FIND_ELEMENT_JS,
            &format!("const el = __wbFind({});", self.js_arg()),
            "if (!el) return false;",
            "el.focus();",
            "const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;",
            "const setter = Object.getOwnPropertyDescriptor(proto, 'value');",
            &format!("if (setter && setter.set) {{ setter.set.call(el, {text_json}); }} else {{ el.value = {text_json}; }}"),
            "el.dispatchEvent(new Event('input', { bubbles: true }));",
            "el.dispatchEvent(new Event('change', { bubbles: true }));",
            "return true;",
            "})()",
        ]
        .join("\n")
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(v) => write!(f, "{}", v),
            Selector::XPath(v) if v.starts_with("//") || v.starts_with("(//") => {
                write!(f, "{}", v)
            }
            Selector::XPath(v) => write!(f, "xpath={}", v),
            Selector::Text(v) => write!(f, "text={}", v),
        }
    }
}

impl TryFrom<String> for Selector {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Selector::parse(&value).ok_or_else(|| "selector must not be empty".to_string())
    }
}

impl From<Selector> for String {
    fn from(value: Selector) -> Self {
        value.to_string()
    }
}

/// Defines `__wbFind(selector)` and `__wbVisible(el)`.
/// Text selectors prefer interactive elements and exact matches, then fall
/// back to the innermost visible element containing the text.
const FIND_ELEMENT_JS: &str = r#"
function __wbVisible(el) {
    if (!el || !el.isConnected) return false;
    if (el.hidden || el.getAttribute('aria-hidden') === 'true') return false;
    const style = getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}
function __wbFind(sel) {
    if (sel.kind === 'xpath') {
        const result = document.evaluate(sel.value, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
        return result.singleNodeValue;
    }
    if (sel.kind === 'text') {
        const wanted = sel.value.trim().toLowerCase();
        const norm = (el) => (el.innerText || el.textContent || '').replace(/\s+/g, ' ').trim().toLowerCase();
        const interactive = Array.from(document.querySelectorAll('button, a, [role="button"], [role="menuitem"], [role="option"], label, li'));
        const exact = interactive.find((el) => __wbVisible(el) && norm(el) === wanted);
        if (exact) return exact;
        const partial = interactive.find((el) => __wbVisible(el) && norm(el).includes(wanted));
        if (partial) return partial;
        let best = null;
        for (const el of document.body ? document.body.querySelectorAll('*') : []) {
            if (!__wbVisible(el)) continue;
            if (norm(el).includes(wanted)) best = el;
        }
        return best;
    }
    return document.querySelector(sel.value);
}
"#;
