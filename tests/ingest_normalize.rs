// tests/ingest_normalize.rs
use fin_pulse::ingest::normalize_text;

const CAP: usize = 1_500;

#[test]
fn empty_is_ok() {
    assert_eq!(normalize_text("", CAP), "");
}

#[test]
fn strips_html_and_unescapes() {
    let s = "<p>Ibovespa&nbsp;<b>fecha</b> em alta &ldquo;forte&rdquo;</p>";
    assert_eq!(normalize_text(s, CAP), r#"Ibovespa fecha em alta "forte""#);
}

#[test]
fn folds_whitespace_and_nbsp() {
    let s = "A\u{00A0}\n\tB   C";
    assert_eq!(normalize_text(s, CAP), "A B C");
}

#[test]
fn length_cap_counts_chars_not_bytes() {
    let s = "ç".repeat(2_000);
    let n = normalize_text(&s, CAP);
    assert_eq!(n.chars().count(), CAP);
}
