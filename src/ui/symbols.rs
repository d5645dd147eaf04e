pub(crate) struct Symbols {
    pub spinner_frames: &'static [&'static str],
    pub prompt: &'static str,
    pub done: &'static str,
    pub active: &'static str,
    pub pending: &'static str,
    pub arrow_right: &'static str,
    pub ellipsis: &'static str,
    pub dot: &'static str,
    pub corner: &'static str,
    pub bullet: &'static str,
    pub warning: &'static str,
}

impl Symbols {
    pub fn current() -> &'static Self {
        #[cfg(windows)]
        {
            let is_modern = std::env::var("WT_SESSION").is_ok()
                || std::env::var("TERM_PROGRAM").is_ok()
                || std::env::var("ALACRITTY_WINDOW_ID").is_ok();
            if !is_modern {
                return &ASCII_SYMBOLS;
            }
        }
        &UNICODE_SYMBOLS
    }
}

const UNICODE_SYMBOLS: Symbols = Symbols {
    spinner_frames: &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"],
    prompt: "❯",
    done: "●",
    active: "◉",
    pending: "○",
    arrow_right: "→",
    ellipsis: "…",
    dot: "·",
    corner: "⎿",
    bullet: "•",
    warning: "⚠",
};

#[allow(dead_code)]
const ASCII_SYMBOLS: Symbols = Symbols {
    spinner_frames: &["|", "/", "-", "\\"],
    prompt: ">",
    done: "[x]",
    active: "[>]",
    pending: "[ ]",
    arrow_right: "->",
    ellipsis: "...",
    dot: "-",
    corner: "\\",
    bullet: "*",
    warning: "!",
};
