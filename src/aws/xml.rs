//! Minimal scanning over Query-protocol XML responses. The control-plane
//! responses we consume are flat, well-formed documents; this extracts tag
//! values and repeated blocks without pulling in an XML parser.

/// Inner text of the first `<tag>...</tag>` occurrence, entity-unescaped.
pub fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let body = tag_blocks(xml, tag).into_iter().next()?;
    Some(unescape(body.trim()))
}

/// Inner bodies of every outermost `<tag>...</tag>` block in document order,
/// balanced against nested occurrences of the same tag name.
pub fn tag_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open_exact = format!("<{tag}>");
    let open_attr = format!("<{tag} ");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some((_, body_start)) = find_open(xml, pos, &open_exact, &open_attr) {
        // Walk forward counting nested opens of the same tag until balanced.
        let mut depth = 1;
        let mut cursor = body_start;
        let body_end = loop {
            let next_open = find_open(xml, cursor, &open_exact, &open_attr);
            let next_close = xml[cursor..].find(&close).map(|i| cursor + i);
            match (next_open, next_close) {
                (Some((o, after_open)), Some(c)) if o < c => {
                    depth += 1;
                    cursor = after_open;
                }
                (_, Some(c)) => {
                    depth -= 1;
                    if depth == 0 {
                        break Some(c);
                    }
                    cursor = c + close.len();
                }
                _ => break None,
            }
        };
        let Some(end) = body_end else { break };
        blocks.push(&xml[body_start..end]);
        pos = end + close.len();
    }
    blocks
}

fn find_open(xml: &str, from: usize, exact: &str, with_attr: &str) -> Option<(usize, usize)> {
    let rest = &xml[from..];
    let hit_exact = rest.find(exact).map(|i| (from + i, from + i + exact.len()));
    let hit_attr = rest.find(with_attr).and_then(|i| {
        // Skip past the attribute list to the closing '>'.
        let tag_start = from + i;
        xml[tag_start..].find('>').map(|g| (tag_start, tag_start + g + 1))
    });
    match (hit_exact, hit_attr) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_tag_value() {
        let xml = "<r><Arn>arn:aws:iam::1:user/dev</Arn><Arn>second</Arn></r>";
        assert_eq!(tag_text(xml, "Arn").as_deref(), Some("arn:aws:iam::1:user/dev"));
    }

    #[test]
    fn missing_tag_is_none() {
        assert_eq!(tag_text("<r></r>", "Arn"), None);
    }

    #[test]
    fn unescapes_entities() {
        let xml = "<Message>User &quot;a&quot; &lt;denied&gt; &amp; rejected</Message>";
        assert_eq!(tag_text(xml, "Message").as_deref(), Some("User \"a\" <denied> & rejected"));
    }

    #[test]
    fn collects_repeated_blocks() {
        let xml = "<list><member><N>a</N></member><member><N>b</N></member></list>";
        let blocks = tag_blocks(xml, "member");
        assert_eq!(blocks.len(), 2);
        assert_eq!(tag_text(blocks[0], "N").as_deref(), Some("a"));
        assert_eq!(tag_text(blocks[1], "N").as_deref(), Some("b"));
    }

    #[test]
    fn balances_nested_same_name_tags() {
        // EC2 reservation items contain instance items
        let xml = "<set><item><id>r-1</id><instancesSet><item><id>i-1</id></item><item><id>i-2</id></item></instancesSet></item></set>";
        let top = tag_blocks(xml, "item");
        assert_eq!(top.len(), 1);
        assert_eq!(tag_text(top[0], "id").as_deref(), Some("r-1"));
        let instance_sets = tag_blocks(top[0], "instancesSet");
        assert_eq!(instance_sets.len(), 1);
        assert_eq!(tag_blocks(instance_sets[0], "item").len(), 2);
    }

    #[test]
    fn handles_tags_with_attributes() {
        let xml = r#"<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>b</Name></ListBucketResult>"#;
        let blocks = tag_blocks(xml, "ListBucketResult");
        assert_eq!(blocks.len(), 1);
        assert_eq!(tag_text(blocks[0], "Name").as_deref(), Some("b"));
    }
}
