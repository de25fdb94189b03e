//! Parsing of user text into slash commands and flow keywords.

/// A `/name[@bot] [args]` command. `name` is lower-cased, without the slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: String,
}

impl Command {
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn has_args(&self) -> bool {
        !self.args.is_empty()
    }
}

/// Flow words accepted with or without a leading slash, in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Done,
    Skip,
    Cancel,
    Submit,
    Edit,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "done" => Some(Self::Done),
            "skip" => Some(Self::Skip),
            "cancel" => Some(Self::Cancel),
            "submit" => Some(Self::Submit),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }

    /// Button payloads reuse the keyword words.
    pub fn from_payload(payload: &str) -> Option<Self> {
        Self::from_word(payload)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Skip => "skip",
            Self::Cancel => "cancel",
            Self::Submit => "submit",
            Self::Edit => "edit",
        }
    }
}

/// One user message, pre-parsed for the states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    /// Trimmed message text.
    pub text: String,
    pub command: Option<Command>,
    pub keyword: Option<Keyword>,
}

impl Input {
    pub fn parse(text: &str) -> Self {
        let text = text.trim().to_string();
        let command = parse_command(&text);
        let keyword = match &command {
            Some(cmd) if !cmd.has_args() => Keyword::from_word(&cmd.name),
            Some(_) => None,
            None => Keyword::from_word(&text),
        };
        Self {
            text,
            command,
            keyword,
        }
    }

    pub fn command_name(&self) -> Option<&str> {
        self.command.as_ref().map(|c| c.name.as_str())
    }
}

fn parse_command(text: &str) -> Option<Command> {
    let rest = text.strip_prefix('/')?;
    let (head, args) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };
    // `/start@weekly_bot` in group chats.
    let name = head.split('@').next().unwrap_or_default();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(Command {
        name: name.to_ascii_lowercase(),
        args: args.to_string(),
    })
}

/// Parse `"{prefix}:{index}"` button payloads such as `mark:2`.
pub fn indexed_payload(payload: &str, prefix: &str) -> Option<usize> {
    payload
        .strip_prefix(prefix)?
        .strip_prefix(':')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_args() {
        let input = Input::parse("  /score 7 ");
        let cmd = input.command.unwrap();
        assert_eq!(cmd.name, "score");
        assert_eq!(cmd.args, "7");
        assert!(input.keyword.is_none());
    }

    #[test]
    fn strips_bot_mention_and_lowercases() {
        let input = Input::parse("/Start@weekly_report_bot");
        assert_eq!(input.command_name(), Some("start"));
        assert_eq!(input.command.unwrap().args, "");
    }

    #[test]
    fn keywords_with_or_without_slash() {
        assert_eq!(Input::parse("done").keyword, Some(Keyword::Done));
        assert_eq!(Input::parse("/DONE").keyword, Some(Keyword::Done));
        assert_eq!(Input::parse(" Skip ").keyword, Some(Keyword::Skip));
        assert_eq!(Input::parse("/cancel").keyword, Some(Keyword::Cancel));
        assert_eq!(Input::parse("done with the report").keyword, None);
        assert_eq!(Input::parse("/done later").keyword, None);
    }

    #[test]
    fn plain_text_and_odd_slashes_are_not_commands() {
        assert!(Input::parse("fixed the build").command.is_none());
        assert!(Input::parse("/").command.is_none());
        assert!(Input::parse("/path/to/file").command.is_none());
        assert!(Input::parse("1/2 done").command.is_none());
    }

    #[test]
    fn indexed_payloads() {
        assert_eq!(indexed_payload("mark:3", "mark"), Some(3));
        assert_eq!(indexed_payload("mark3", "mark"), None);
        assert_eq!(indexed_payload("carry:all", "carry"), None);
        assert_eq!(indexed_payload("score:10", "mark"), None);
    }
}
