use super::*;

const DELETE_MSG: &str =
    "*3\r\n$7\r\nmessage\r\n$12\r\ntimeline:308\r\n$38\r\n{\"event\":\"delete\",\"payload\":\"1038647\"}\r\n";

#[test]
fn parse_redis_subscribe() -> Result<(), RedisParseErr> {
    let input = "*3\r\n$9\r\nsubscribe\r\n$15\r\ntimeline:public\r\n:1\r\n";

    let r_subscribe = match RedisParseOutput::try_from(input) {
        Ok(NonMsg(leftover)) => leftover,
        Ok(Msg(msg)) => panic!("unexpectedly got a msg: {:?}", msg),
        Err(e) => panic!("Error in parsing subscribe command: {}", e),
    };
    assert!(r_subscribe.is_empty());

    Ok(())
}

#[test]
fn parse_redis_detects_non_newline() {
    let input =
        "*3QQ$7\r\nmessage\r\n$12\r\ntimeline:308\r\n$38\r\n{\"event\":\"delete\",\"payload\":\"1038647\"}\r\n";

    match RedisParseOutput::try_from(input) {
        Ok(NonMsg(leftover)) => panic!(
            "Parsed an invalid msg as a non-msg.\nInput `{}` parsed to NonMsg({})",
            &input, leftover
        ),
        Ok(Msg(msg)) => panic!(
            "Parsed an invalid msg as a msg.\nInput `{}` parsed to {:?}",
            &input, msg
        ),
        Err(e) => assert_ne!(e, RedisParseErr::Incomplete),
    };
}

#[test]
fn parse_redis_msg() -> Result<(), RedisParseErr> {
    let r_msg = match RedisParseOutput::try_from(DELETE_MSG)? {
        NonMsg(leftover) => panic!("Parsed a msg as a non-msg: {:?}", leftover),
        Msg(msg) => msg,
    };

    assert!(r_msg.leftover_input.is_empty());
    assert_eq!(r_msg.channel_txt, "timeline:308");
    assert_eq!(r_msg.event_txt, r#"{"event":"delete","payload":"1038647"}"#);
    Ok(())
}

#[test]
fn parse_redis_msg_with_multibyte_content() -> Result<(), RedisParseErr> {
    let event = r#"{"event":"delete","payload":"ü"}"#;
    let input = format!(
        "*3\r\n$7\r\nmessage\r\n$10\r\ntimeline:1\r\n${}\r\n{}\r\n",
        event.len(),
        event
    );
    match RedisParseOutput::try_from(input.as_str())? {
        Msg(msg) => assert_eq!(msg.event_txt, event),
        NonMsg(_) => panic!("expected a msg"),
    }
    Ok(())
}

#[test]
fn every_truncation_is_incomplete() {
    for end in 0..DELETE_MSG.len() {
        assert_eq!(
            RedisParseOutput::try_from(&DELETE_MSG[..end]),
            Err(RedisParseErr::Incomplete),
            "input truncated to {} bytes",
            end
        );
    }
}

#[test]
fn back_to_back_messages_leave_the_second_as_leftover() -> Result<(), RedisParseErr> {
    let input = [DELETE_MSG, DELETE_MSG].concat();
    let leftover = match RedisParseOutput::try_from(input.as_str())? {
        Msg(msg) => msg.leftover_input,
        NonMsg(_) => panic!("expected a msg"),
    };
    assert_eq!(leftover, DELETE_MSG);
    Ok(())
}

#[test]
fn replies_to_commands() -> Result<(), RedisParseErr> {
    let ok = RedisReply::try_from("+OK\r\n-ERR wrong number of arguments\r\n")?;
    assert_eq!(ok.error, None);
    let err = RedisReply::try_from(ok.leftover_input)?;
    assert_eq!(err.error, Some("ERR wrong number of arguments"));
    assert!(err.leftover_input.is_empty());

    assert_eq!(RedisReply::try_from("$-1\r\n")?.error, None);
    assert_eq!(RedisReply::try_from("+OK\r"), Err(RedisParseErr::Incomplete));
    Ok(())
}
