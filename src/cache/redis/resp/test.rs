use super::*;

#[test]
fn parse_status_and_error() -> Result<(), RespParseErr> {
    assert_eq!(parse_reply(b"+OK\r\n")?, (Reply::Status("OK".into()), 5));
    let (reply, used) = parse_reply(b"-WRONGTYPE Operation against a key\r\n")?;
    assert_eq!(reply, Reply::Error("WRONGTYPE Operation against a key".into()));
    assert_eq!(used, 36);
    Ok(())
}

#[test]
fn parse_negative_integer() -> Result<(), RespParseErr> {
    assert_eq!(parse_reply(b":-2\r\n")?, (Reply::Integer(-2), 5));
    Ok(())
}

#[test]
fn parse_nil_bulk_and_nil_array() -> Result<(), RespParseErr> {
    assert_eq!(parse_reply(b"$-1\r\n")?.0, Reply::Nil);
    assert_eq!(parse_reply(b"*-1\r\n")?.0, Reply::Nil);
    Ok(())
}

#[test]
fn parse_zrevrange_withscores() -> Result<(), RespParseErr> {
    let input = b"*4\r\n$24\r\n17c1a2b3c4d5e6f7aabbccdd\r\n$22\r\n1.7123456781234568e+18\r\n\
                  $2\r\nab\r\n$1\r\n5\r\n";
    let (reply, used) = parse_reply(input)?;
    assert_eq!(used, input.len());
    assert_eq!(
        reply,
        Reply::Array(vec![
            Reply::Bulk(b"17c1a2b3c4d5e6f7aabbccdd".to_vec()),
            Reply::Bulk(b"1.7123456781234568e+18".to_vec()),
            Reply::Bulk(b"ab".to_vec()),
            Reply::Bulk(b"5".to_vec()),
        ])
    );
    Ok(())
}

#[test]
fn parse_bulk_string_containing_crlf() -> Result<(), RespParseErr> {
    let (reply, _) = parse_reply(b"$4\r\na\r\nb\r\n")?;
    assert_eq!(reply, Reply::Bulk(b"a\r\nb".to_vec()));
    Ok(())
}

#[test]
fn leaves_the_next_reply_unparsed() -> Result<(), RespParseErr> {
    let input = b":1\r\n:2\r\n";
    let (first, used) = parse_reply(input)?;
    assert_eq!(first, Reply::Integer(1));
    assert_eq!(parse_reply(&input[used..])?.0, Reply::Integer(2));
    Ok(())
}

#[test]
fn partial_input_is_incomplete() {
    let inputs: [&[u8]; 5] = [b"", b"+OK", b"$5\r\nhel", b"$5\r\nhello", b"*2\r\n:1\r\n"];
    for input in inputs {
        assert!(
            matches!(parse_reply(input), Err(RespParseErr::Incomplete)),
            "`{}` should be incomplete",
            String::from_utf8_lossy(input)
        );
    }
}

#[test]
fn parse_detects_bad_input() {
    assert!(matches!(
        parse_reply(b"HTTP/1.1 400 Bad Request\r\n"),
        Err(RespParseErr::InvalidLineStart(_))
    ));
    assert!(matches!(
        parse_reply(b"$2\r\nabcd\r\n"),
        Err(RespParseErr::InvalidLineEnd)
    ));
    assert!(matches!(
        parse_reply(b":x1\r\n"),
        Err(RespParseErr::InvalidNumber(_))
    ));
}

#[test]
fn encode_zadd() {
    let cmd = encode_cmd(&["ZADD", "timeline:home:1", "LT", "17", "t1"]);
    assert_eq!(
        cmd,
        b"*5\r\n$4\r\nZADD\r\n$15\r\ntimeline:home:1\r\n$2\r\nLT\r\n$2\r\n17\r\n$2\r\nt1\r\n"
            .to_vec()
    );
}
