use std::sync::LazyLock;

use regex::Regex;

// special tokens of the supported tokenizers, e.g. <eos>, <loc0042>, <|im_end|>, [SEP]
static CONTROL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"<\|[A-Za-z0-9_]+\|>",
        r"|</?(?:eos|bos|pad|unk|mask|s|image|end_of_utterance|start_of_turn|end_of_turn|fake_token_around_image|global-img)>",
        r"|<loc\d{4}>|<seg\d{3}>|<row_\d+_col_\d+>",
        r"|\[(?:CLS|SEP|PAD|UNK|MASK)\]",
    ))
    .expect("control token pattern is valid")
});

static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("spaces pattern is valid"));

/// Removes model-internal control tokens from a decoded answer.
///
/// Runs of spaces left behind are collapsed and every line is trimmed. Line
/// breaks of multi-line answers are kept.
pub fn strip_control_tokens(text: &str) -> String {
    let stripped = CONTROL_TOKEN.replace_all(text, " ");
    let collapsed = SPACES.replace_all(&stripped, " ");
    collapsed
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
