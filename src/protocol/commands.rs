//! Module `commands`
//!
//! Parses text units received by the server into [`Command`] values.

pub const LIST_FILES: &str = "LIST_FILES";
pub const FILE_INFO: &str = "FILE_INFO";
pub const GET_FILE: &str = "GET_FILE";
pub const UPLOAD_PREFIX: &str = "UPLOAD:";

/// A command sent by a client.
///
/// Command words are case-sensitive. Anything that is not a recognised
/// command is carried as `Text` and echoed back.
#[derive(Debug, PartialEq)]
pub enum Command {
    ListFiles,
    FileInfo(i64),
    GetFile(i64),
    Upload { name: String, size: u64 },
    /// `FILE_INFO`/`GET_FILE` whose argument is not a single integer
    InvalidIndex(String),
    /// `UPLOAD:` header whose size does not parse; ignored
    MalformedUpload(String),
    Text(String),
    Empty,
}

/// Parses one text unit into a `Command`.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }

    if let Some(header) = trimmed.strip_prefix(UPLOAD_PREFIX) {
        return parse_upload(header);
    }

    let mut parts = trimmed.split_whitespace();
    let word = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match (word, args.as_slice()) {
        (LIST_FILES, []) => Command::ListFiles,
        (FILE_INFO, [arg]) => arg
            .parse()
            .map(Command::FileInfo)
            .unwrap_or_else(|_| Command::InvalidIndex(trimmed.to_string())),
        (GET_FILE, [arg]) => arg
            .parse()
            .map(Command::GetFile)
            .unwrap_or_else(|_| Command::InvalidIndex(trimmed.to_string())),
        (FILE_INFO | GET_FILE, [_, _, ..]) => Command::InvalidIndex(trimmed.to_string()),
        _ => Command::Text(trimmed.to_string()),
    }
}

/// `<name>:<size>`; the size is whatever follows the last colon.
fn parse_upload(header: &str) -> Command {
    match header.rsplit_once(':') {
        Some((name, size)) => match size.trim().parse::<u64>() {
            Ok(size) => Command::Upload {
                name: name.to_string(),
                size,
            },
            Err(_) => Command::MalformedUpload(header.to_string()),
        },
        None => Command::MalformedUpload(header.to_string()),
    }
}

/// Builds the `UPLOAD:<name>:<size>` header line a client sends.
pub fn upload_header(name: &str, size: u64) -> String {
    format!("{UPLOAD_PREFIX}{name}:{size}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse_command("LIST_FILES"), Command::ListFiles);
        assert_eq!(parse_command("FILE_INFO 3"), Command::FileInfo(3));
        assert_eq!(parse_command("GET_FILE 0"), Command::GetFile(0));
        assert_eq!(parse_command("FILE_INFO -1"), Command::FileInfo(-1));
    }

    #[test]
    fn test_parse_with_whitespace() {
        assert_eq!(parse_command("  LIST_FILES \r"), Command::ListFiles);
        assert_eq!(parse_command("GET_FILE    7  "), Command::GetFile(7));
        assert_eq!(parse_command("   "), Command::Empty);
    }

    #[test]
    fn test_commands_are_case_sensitive() {
        assert_eq!(
            parse_command("list_files"),
            Command::Text("list_files".to_string())
        );
        assert_eq!(
            parse_command("LIST_FILES now"),
            Command::Text("LIST_FILES now".to_string())
        );
    }

    #[test]
    fn test_bad_indices() {
        assert_eq!(
            parse_command("FILE_INFO abc"),
            Command::InvalidIndex("FILE_INFO abc".to_string())
        );
        assert_eq!(
            parse_command("GET_FILE 1 2"),
            Command::InvalidIndex("GET_FILE 1 2".to_string())
        );
        assert_eq!(
            parse_command("GET_FILE"),
            Command::Text("GET_FILE".to_string())
        );
    }

    #[test]
    fn test_parse_upload() {
        assert_eq!(
            parse_command("UPLOAD:b.txt:5"),
            Command::Upload {
                name: "b.txt".to_string(),
                size: 5
            }
        );
        assert_eq!(
            parse_command("UPLOAD:notes: v2.txt:0"),
            Command::Upload {
                name: "notes: v2.txt".to_string(),
                size: 0
            }
        );
        assert_eq!(
            parse_command("UPLOAD:b.txt:-5"),
            Command::MalformedUpload("b.txt:-5".to_string())
        );
        assert_eq!(
            parse_command("UPLOAD:b.txt"),
            Command::MalformedUpload("b.txt".to_string())
        );
    }

    #[test]
    fn test_upload_header_round_trips() {
        let line = upload_header("report.pdf", 1024);
        assert_eq!(line, "UPLOAD:report.pdf:1024\n");
        assert_eq!(
            parse_command(&line),
            Command::Upload {
                name: "report.pdf".to_string(),
                size: 1024
            }
        );
    }

    #[test]
    fn test_unknown_text() {
        assert_eq!(
            parse_command("Hello Server!"),
            Command::Text("Hello Server!".to_string())
        );
    }
}
