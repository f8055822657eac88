use {super::*, std::collections::HashSet};

#[test]
fn topic_decoding() {
    let topic_str = "85089843cebc89ce5bbffd55377b2e65c8a32c2d0a76742f2d6852b5f531a460";
    let topic_bin = topic_str.parse::<DecodedTopic>().unwrap();

    assert_eq!(topic_str, Topic::from(topic_bin).as_ref());

    assert!(matches!(
        "85089843ce".parse::<DecodedTopic>(),
        Err(DecodingError::Length)
    ));

    assert!(matches!(
        "zz089843cebc89ce5bbffd55377b2e65c8a32c2d0a76742f2d6852b5f531a460".parse::<DecodedTopic>(),
        Err(DecodingError::Encoding)
    ));
}

#[test]
fn generated_topics_decode() {
    let topic = Topic::generate();

    assert_eq!(topic.as_ref().len(), DecodedTopic::LENGTH * 2);
    assert!(topic.decode().is_ok());
    assert_ne!(topic, Topic::generate());
}

#[test]
fn message_ids_are_unique_and_valid() {
    let generator = MessageIdGenerator::new();
    let ids = (0..200).map(|_| generator.next()).collect::<Vec<_>>();

    assert!(ids.iter().all(MessageId::validate));
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
}

#[test]
fn message_id_from_string() {
    let id: MessageId = serde_json::from_str(r#""1659980684711969""#).unwrap();

    assert_eq!(id, MessageId::new(1659980684711969));
}
