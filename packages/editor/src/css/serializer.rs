use super::stylesheet::{Declarations, StyleRule, StyleSheet};

/// Pretty-print a stylesheet
///
/// Empty rules and empty groups are omitted.
pub fn serialize_stylesheet(sheet: &StyleSheet) -> String {
    let mut blocks = Vec::new();

    if !sheet.statements.is_empty() {
        blocks.push(sheet.statements.join("\n"));
    }

    for set in &sheet.rule_sets {
        let rules: Vec<&StyleRule> = set
            .rules
            .iter()
            .filter(|r| !r.declarations.is_empty())
            .collect();
        if rules.is_empty() {
            continue;
        }

        match &set.condition {
            None => {
                for rule in rules {
                    blocks.push(serialize_rule(rule, ""));
                }
            }
            Some(condition) => {
                let inner = rules
                    .iter()
                    .map(|r| serialize_rule(r, "  "))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                blocks.push(format!("{} {{\n{}\n}}", condition, inner));
            }
        }
    }

    let mut output = blocks.join("\n\n");
    if !output.is_empty() {
        output.push('\n');
    }
    output
}

fn serialize_rule(rule: &StyleRule, indent: &str) -> String {
    format!(
        "{indent}{} {{\n{}{indent}}}",
        rule.selector,
        serialize_declarations(&rule.declarations, &format!("{indent}  ")),
        indent = indent
    )
}

fn serialize_declarations(declarations: &Declarations, indent: &str) -> String {
    declarations
        .iter()
        .map(|d| format!("{}{}: {};\n", indent, d.property, d.value))
        .collect()
}

/// Inline `style` attribute text
pub fn serialize_inline(declarations: &Declarations) -> String {
    declarations
        .iter()
        .map(|d| format!("{}: {};", d.property, d.value))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parse_stylesheet;

    #[test]
    fn test_pretty_print() {
        let mut sheet = StyleSheet::new();
        sheet.declarations_or_create(None, ".card").set("width", "200px");
        sheet
            .declarations_or_create(Some("@media (max-width: 991px)"), ".card")
            .set("width", "100px");

        assert_eq!(
            serialize_stylesheet(&sheet),
            ".card {\n  width: 200px;\n}\n\n@media (max-width: 991px) {\n  .card {\n    width: 100px;\n  }\n}\n"
        );
    }

    #[test]
    fn test_empty_rules_are_skipped() {
        let mut sheet = StyleSheet::new();
        sheet.declarations_or_create(None, ".empty");
        sheet.declarations_or_create(Some("@media print"), ".gone");
        assert_eq!(serialize_stylesheet(&sheet), "");
    }

    #[test]
    fn test_output_reparses_to_same_model() {
        let source = "@import url(a.css);\n.a { color: red; margin: 0 auto; }\n@media (max-width: 767px) { .a { color: blue; } }";
        let sheet = parse_stylesheet(source).unwrap();
        let printed = serialize_stylesheet(&sheet);
        assert_eq!(parse_stylesheet(&printed).unwrap(), sheet);
    }

    #[test]
    fn test_base_rule_after_group_stays_after_it() {
        let source = "@media (max-width: 991px) {\n  .card {\n    width: 100px;\n  }\n}\n\n.card {\n  width: 300px;\n}\n";
        let sheet = parse_stylesheet(source).unwrap();
        assert_eq!(serialize_stylesheet(&sheet), source);
    }

    #[test]
    fn test_inline_style_text() {
        let mut decls = Declarations::new();
        decls.set("color", "red");
        decls.set("width", "10px");
        assert_eq!(serialize_inline(&decls), "color: red; width: 10px;");
    }
}
