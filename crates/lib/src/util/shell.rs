//! Quoting helpers for values interpolated into instructions.

/// Quote a word for POSIX `sh`.
///
/// Words made only of characters with no shell meaning are returned as-is so
/// the common case stays readable. Everything else is single-quoted.
pub fn quote(word: &str) -> String {
  let plain = !word.is_empty()
    && word
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '/' | ':' | '=' | '@' | '%' | ','));
  if plain {
    return word.to_string();
  }
  format!("'{}'", word.replace('\'', r"'\''"))
}

/// Escape text for use inside a double-quoted shell string.
///
/// Unlike [`quote`], the caller controls where the quotes go, so a trusted
/// prefix such as `${REPO_DIR}` can still expand.
pub fn escape_double_quoted(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    if matches!(c, '\\' | '"' | '`' | '$') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

/// Quote a value as a double-quoted Dockerfile word.
///
/// Backslashes and double quotes are escaped, line breaks become a literal
/// `\n` so the value can never end the instruction early. When `literal` is
/// set, `$` is escaped too and no variable expansion happens. Otherwise a `$`
/// is kept only when it starts a complete `$NAME` or `${NAME}` reference
/// (optionally with a `:-`, `:+` or `:?` modifier); any other `$` is escaped
/// so the engine never sees an unterminated substitution.
pub fn double_quote(value: &str, literal: bool) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('"');
  for (idx, c) in value.char_indices() {
    match c {
      '\\' => out.push_str(r"\\"),
      '"' => out.push_str("\\\""),
      '\n' => out.push_str(r"\\n"),
      '\r' => out.push_str(r"\\r"),
      '$' if literal || !starts_expansion(&value[idx + 1..]) => out.push_str(r"\$"),
      c => out.push(c),
    }
  }
  out.push('"');
  out
}

/// Whether the text following a `$` forms a variable reference the engine
/// can parse.
fn starts_expansion(rest: &str) -> bool {
  if let Some(braced) = rest.strip_prefix('{') {
    let Some(end) = braced.find('}') else {
      return false;
    };
    let inner = &braced[..end];
    let name_len = inner
      .char_indices()
      .find(|(i, c)| !(c.is_ascii_alphabetic() || *c == '_' || (*i > 0 && c.is_ascii_digit())))
      .map(|(i, _)| i)
      .unwrap_or(inner.len());
    if name_len == 0 {
      return false;
    }
    let modifier = &inner[name_len..];
    return modifier.is_empty()
      || ((modifier.starts_with(":-") || modifier.starts_with(":+") || modifier.starts_with(":?"))
        && !modifier[2..].contains(['{', '$', '"']));
  }

  rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_words_are_unquoted() {
    assert_eq!(quote("binder/postBuild"), "binder/postBuild");
    assert_eq!(quote("libstdc++6"), "libstdc++6");
  }

  #[test]
  fn special_words_are_single_quoted() {
    assert_eq!(quote("my script.sh"), "'my script.sh'");
    assert_eq!(quote("it's"), r"'it'\''s'");
    assert_eq!(quote(""), "''");
  }

  #[test]
  fn escape_double_quoted_neutralizes_expansion() {
    assert_eq!(escape_double_quoted("start"), "start");
    assert_eq!(escape_double_quoted("$(id)`x`\"y\""), r#"\$(id)\`x\`\"y\""#);
  }

  #[test]
  fn double_quote_escapes_terminators() {
    assert_eq!(double_quote(r#"say "hi""#, false), r#""say \"hi\"""#);
    assert_eq!(double_quote("a\nb", false), r#""a\\nb""#);
    assert_eq!(double_quote(r"C:\dir", false), r#""C:\\dir""#);
  }

  #[test]
  fn unterminated_substitutions_are_escaped() {
    assert_eq!(double_quote("cost ${", false), r#""cost \${""#);
    assert_eq!(double_quote("${PATH", false), r#""\${PATH""#);
    assert_eq!(double_quote("${}", false), r#""\${}""#);
    assert_eq!(double_quote("${a b}", false), r#""\${a b}""#);
    assert_eq!(double_quote("${1}", false), r#""\${1}""#);
    assert_eq!(double_quote("100$", false), r#""100\$""#);
  }

  #[test]
  fn complete_references_still_expand() {
    assert_eq!(double_quote("$HOME/bin", false), r#""$HOME/bin""#);
    assert_eq!(double_quote("${HOME:-/root}", false), r#""${HOME:-/root}""#);
    assert_eq!(double_quote("${REPO_DIR}/start", false), r#""${REPO_DIR}/start""#);
    assert_eq!(double_quote("${A}${B", false), r#""${A}\${B""#);
  }

  #[test]
  fn double_quote_keeps_expansion_unless_literal() {
    assert_eq!(double_quote("${PATH}", false), r#""${PATH}""#);
    assert_eq!(double_quote("${PATH}", true), r#""\${PATH}""#);
  }
}
