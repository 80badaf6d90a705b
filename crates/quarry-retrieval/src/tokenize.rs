/// Lexical normalization shared by indexing and querying.
///
/// Splits on non-alphanumeric characters and case-folds. With stemming on,
/// a handful of English inflectional suffixes are stripped so that
/// "transformers" and "transformer" meet in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tokenizer {
    stemming: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stemming(mut self, stemming: bool) -> Self {
        self.stemming = stemming;
        self
    }

    pub fn stemming(&self) -> bool {
        self.stemming
    }

    /// Tokenize text into a Vec of normalized tokens, preserving duplicates.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| {
                let folded = w.to_lowercase();
                if self.stemming {
                    light_stem(&folded)
                } else {
                    folded
                }
            })
            .collect()
    }
}

fn light_stem(word: &str) -> String {
    let len = word.chars().count();
    if len <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("sses") {
        return format!("{stem}ss");
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if len > 5 {
        if let Some(stem) = word.strip_suffix("ing") {
            return stem.to_string();
        }
    }
    if len > 4 {
        if let Some(stem) = word.strip_suffix("ed") {
            return stem.to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}
