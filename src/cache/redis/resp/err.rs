use std::{error::Error, fmt};

#[derive(Debug)]
pub enum RespParseErr {
    Incomplete,
    InvalidNumber(std::num::ParseIntError),
    InvalidUtf8(std::str::Utf8Error),
    InvalidLineStart(String),
    InvalidLineEnd,
}

impl fmt::Display for RespParseErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use RespParseErr::*;
        let msg = match self {
            Incomplete => "The input from Redis does not form a complete reply, likely because \
                           the input buffer filled partway through a reply.  Save this input \
                           and try again with additional input from Redis."
                .to_string(),
            InvalidNumber(parse_int_err) => format!(
                "Redis indicated that an item would be a number, but it could not be parsed: {}",
                parse_int_err
            ),
            InvalidUtf8(utf8_err) => format!(
                "Redis sent a status line that is not valid UTF-8: {}",
                utf8_err
            ),
            InvalidLineStart(line_start_char) => format!(
                "A line from Redis started with `{}`, which is not a valid character to indicate \
                 the type of the Redis line.",
                line_start_char
            ),
            InvalidLineEnd => "A Redis line ended before expected line length".to_string(),
        };
        write!(f, "{}", msg)
    }
}

impl Error for RespParseErr {}

impl From<std::num::ParseIntError> for RespParseErr {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::InvalidNumber(error)
    }
}

impl From<std::str::Utf8Error> for RespParseErr {
    fn from(error: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8(error)
    }
}
