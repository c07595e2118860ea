use searchcore::tokenizer::analyze;

#[test]
fn it_normalizes_and_lowercases() {
    let words = analyze("Running Runners RUN! Ｃａｆｅ menu.");
    assert_eq!(words, vec!["running", "runners", "run", "cafe", "menu"]);
}

#[test]
fn it_filters_stopwords() {
    let words = analyze("The quick brown fox and the lazy dog didn't jump");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert!(!words.contains(&"didn".to_string()));
    assert!(!words.contains(&"t".to_string()));
    assert!(words.contains(&"fox".to_string()));
}

#[test]
fn it_keeps_repeated_words() {
    assert_eq!(analyze("cats, Cats and CATS"), vec!["cats", "cats", "cats"]);
}

#[test]
fn it_is_deterministic() {
    let text = "Ünïcode text: 42 ways to say naïve; 東京 and résumé.";
    assert_eq!(analyze(text), analyze(text));
    assert!(analyze(text).contains(&"東京".to_string()));
    assert!(analyze(text).contains(&"42".to_string()));
}
