// fillpdf-service/src/backend/xfdf.rs

use std::collections::BTreeMap;

/// XFDF document setting each named field to its value.
pub fn to_xfdf(values: &BTreeMap<String, String>) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <xfdf xmlns=\"http://ns.adobe.com/xfdf/\" xml:space=\"preserve\">\n<fields>\n",
    );
    for (name, value) in values {
        xml.push_str(&format!(
            "<field name=\"{}\"><value>{}</value></field>\n",
            escape_xml(name),
            escape_xml(value)
        ));
    }
    xml.push_str("</fields>\n</xfdf>\n");
    xml
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_names_and_values() {
        let mut values = BTreeMap::new();
        values.insert("a\"b".to_string(), "1 < 2 & 3".to_string());
        let xml = to_xfdf(&values);
        assert!(xml.contains("<field name=\"a&quot;b\"><value>1 &lt; 2 &amp; 3</value></field>"));
        assert!(xml.starts_with("<?xml"));
    }
}
