// Copyright 2018 `streaming-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! End-to-end parsing scenarios, driven through the public API only.

use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use rand::Rng;

use streaming_multipart::targets::{ListTarget, ValueTarget};
use streaming_multipart::{
    Error, ErrorClass, MaxSizeValidator, Parser, Target, TargetError, ValidatedTarget,
};

const S1_BODY: &[u8] = b"--1234\r\n\
    Content-Disposition: form-data; name=\"a\"\r\n\
    \r\n\
    foo\r\n\
    --1234\r\n\
    Content-Disposition: form-data; name=\"b\"\r\n\
    \r\n\
    bar\r\n\
    --1234--";

fn form_data_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("multipart/form-data; boundary=1234"),
    );
    headers
}

/// Records every lifecycle call it receives, optionally failing on data.
#[derive(Default)]
struct RecordingTarget {
    events: Vec<Event>,
    fail_on_data: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Event {
    Started,
    Data(Vec<u8>),
    Finished,
    Filename(String),
    ContentType(String),
}

impl RecordingTarget {
    fn new() -> RecordingTarget {
        RecordingTarget::default()
    }

    fn failing() -> RecordingTarget {
        RecordingTarget {
            fail_on_data: true,
            ..RecordingTarget::default()
        }
    }

    fn body(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Data(bytes) => Some(&bytes[..]),
                _ => None,
            })
            .collect::<Vec<_>>()
            .concat()
    }
}

impl Target for RecordingTarget {
    fn start(&mut self) -> Result<(), TargetError> {
        self.events.push(Event::Started);
        Ok(())
    }

    fn data_received(&mut self, chunk: &[u8]) -> Result<(), TargetError> {
        if self.fail_on_data {
            return Err(TargetError::Custom("sink refused the data".into()));
        }

        self.events.push(Event::Data(chunk.to_vec()));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TargetError> {
        self.events.push(Event::Finished);
        Ok(())
    }

    fn set_multipart_filename(&mut self, filename: &str) {
        self.events.push(Event::Filename(filename.to_owned()));
    }

    fn set_multipart_content_type(&mut self, content_type: &str) {
        self.events.push(Event::ContentType(content_type.to_owned()));
    }
}

/// Parse `body` in the given chunks and return the collected `a`/`b` values.
fn parse_s1_in_chunks(chunks: &[&[u8]]) -> (Vec<u8>, Vec<u8>) {
    let _ = env_logger::try_init();

    let mut a = ValueTarget::new();
    let mut b = ValueTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();
        parser.register("b", &mut b).unwrap();

        for chunk in chunks {
            parser.feed_chunk(chunk).unwrap();
        }

        assert!(parser.is_done());
    }

    (a.into_value(), b.into_value())
}

#[test]
fn two_fields_in_one_chunk() {
    let (a, b) = parse_s1_in_chunks(&[S1_BODY]);

    assert_eq!(a, b"foo");
    assert_eq!(b, b"bar");
}

#[test]
fn two_fields_one_byte_at_a_time() {
    let chunks: Vec<&[u8]> = S1_BODY.chunks(1).collect();
    let (a, b) = parse_s1_in_chunks(&chunks);

    assert_eq!(a, b"foo");
    assert_eq!(b, b"bar");
}

#[test]
fn every_split_point_gives_the_same_result() {
    for split in 0..=S1_BODY.len() {
        let (left, right) = S1_BODY.split_at(split);
        let (a, b) = parse_s1_in_chunks(&[left, right]);

        assert_eq!(a, b"foo", "split at {}", split);
        assert_eq!(b, b"bar", "split at {}", split);
    }
}

#[test]
fn random_partitions_give_the_same_result() {
    let mut rng = rand::thread_rng();
    let sizes = [1usize, 2, 7, 8192, S1_BODY.len()];

    for _ in 0..32 {
        let mut chunks = Vec::new();
        let mut rest = S1_BODY;

        while !rest.is_empty() {
            let size = sizes[rng.gen_range(0, sizes.len())].min(rest.len());
            let (chunk, tail) = rest.split_at(size);
            chunks.push(chunk);
            rest = tail;
        }

        let (a, b) = parse_s1_in_chunks(&chunks);
        assert_eq!(a, b"foo");
        assert_eq!(b, b"bar");
    }
}

#[test]
fn empty_chunks_are_harmless() {
    let (left, right) = S1_BODY.split_at(20);
    let (a, b) = parse_s1_in_chunks(&[b"", left, b"", right, b""]);

    assert_eq!(a, b"foo");
    assert_eq!(b, b"bar");
}

#[test]
fn near_miss_boundary_stays_in_the_body() {
    let body = b"--1234\r\n\
        Content-Disposition: form-data; name=\"files\"\r\n\
        \r\n\
        Foo\r\n--123\r\n\
        --1234--";

    // whole and byte-by-byte must agree
    for step in &[body.len(), 1] {
        let mut files = ValueTarget::new();

        {
            let mut parser = Parser::new(&form_data_headers()).unwrap();
            parser.register("files", &mut files).unwrap();

            for chunk in body.chunks(*step) {
                parser.feed_chunk(chunk).unwrap();
            }

            assert!(parser.is_done());
        }

        assert_eq!(files.value(), b"Foo\r\n--123");
    }
}

#[test]
fn bodies_full_of_delimiter_fragments() {
    // Hyphens, CRs, LFs, and the boundary with one byte off.
    let content: &[u8] = b"\r\n--\r--1235\r\n\r\n----12341234--\r--1234x\r\n-";

    let mut body = Vec::new();
    body.extend_from_slice(b"--1234\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n--1234--");

    for step in &[1usize, 2, 7, body.len()] {
        let mut a = ValueTarget::new();

        {
            let mut parser = Parser::new(&form_data_headers()).unwrap();
            parser.register("a", &mut a).unwrap();

            for chunk in body.chunks(*step) {
                parser.feed_chunk(chunk).unwrap();
            }
        }

        assert_eq!(a.value(), content, "chunk size {}", step);
    }
}

#[test]
fn filename_and_content_type_arrive_before_start() {
    let body = b"--1234\r\n\
        Content-Disposition: form-data; name=\"files\"; filename=\"ab.txt\"\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        Foo\r\n--1234--";

    let mut files = RecordingTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("files", &mut files).unwrap();
        parser.feed_chunk(body).unwrap();
    }

    assert_eq!(
        files.events,
        vec![
            Event::Filename("ab.txt".into()),
            Event::ContentType("text/plain".into()),
            Event::Started,
            Event::Data(b"Foo".to_vec()),
            Event::Finished,
        ]
    );
}

#[test]
fn value_target_records_part_attributes() {
    let body = b"--1234\r\n\
        Content-Disposition: form-data; name=\"files\"; filename=\"ab.txt\"\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        Foo\r\n--1234--";

    let mut files = ValueTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("files", &mut files).unwrap();
        parser.feed_chunk(body).unwrap();
    }

    assert_eq!(files.multipart_filename(), Some("ab.txt"));
    assert_eq!(files.multipart_content_type(), Some("text/plain"));
    assert_eq!(files.value(), b"Foo");
}

#[test]
fn strict_mode_rejects_unregistered_names() {
    let body = b"--1234\r\n\
        Content-Disposition: form-data; name=\"extra\"\r\n\
        \r\n\
        hidden\r\n--1234--";

    let mut known = RecordingTarget::new();
    let err;

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap().strict();
        parser.register("known", &mut known).unwrap();

        err = parser.feed_chunk(body).unwrap_err();
    }

    match &err {
        Error::UnexpectedPart(name) => assert_eq!(name, "extra"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.class(), ErrorClass::UnexpectedPart);

    // nothing was delivered anywhere
    assert!(known.events.is_empty());
}

#[test]
fn terminator_split_at_the_very_edge() {
    let body = S1_BODY;
    let (rest, tail) = body.split_at(body.len() - 2);
    assert_eq!(tail, b"--");

    let mut a = ValueTarget::new();
    let mut b = ValueTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();
        parser.register("b", &mut b).unwrap();

        parser.feed_chunk(rest).unwrap();
        assert!(!parser.is_done());

        parser.feed_chunk(tail).unwrap();
        assert!(parser.is_done());

        // anything after the terminator is ignored
        parser.feed_chunk(b"\r\nepilogue to discard").unwrap();
        assert!(parser.is_done());
    }

    assert_eq!(a.value(), b"foo");
    assert_eq!(b.value(), b"bar");
}

#[test]
fn lifecycle_is_start_data_finish() {
    let mut a = RecordingTarget::new();
    let mut b = RecordingTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();
        parser.register("b", &mut b).unwrap();

        for chunk in S1_BODY.chunks(3) {
            parser.feed_chunk(chunk).unwrap();
        }
    }

    for target in &[&a, &b] {
        assert_eq!(target.events.first(), Some(&Event::Started));
        assert_eq!(target.events.last(), Some(&Event::Finished));
        assert_eq!(
            target
                .events
                .iter()
                .filter(|event| matches!(event, Event::Started | Event::Finished))
                .count(),
            2
        );
    }

    assert_eq!(a.body(), b"foo");
    assert_eq!(b.body(), b"bar");
}

#[test]
fn empty_part_still_gets_start_and_finish() {
    let body = b"--1234\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\
        \r\n\
        \r\n--1234--";

    let mut a = RecordingTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();
        parser.feed_chunk(body).unwrap();
    }

    assert_eq!(a.events, vec![Event::Started, Event::Finished]);
}

#[test]
fn multiple_targets_for_one_name_in_registration_order() {
    let mut first = RecordingTarget::new();
    let mut second = ValueTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut first).unwrap();
        parser.register("a", &mut second).unwrap();
        parser.feed_chunk(S1_BODY).unwrap();
    }

    assert_eq!(first.body(), b"foo");
    assert_eq!(second.value(), b"foo");
}

#[test]
fn repeated_part_names_accumulate_in_a_list_target() {
    let body = b"--1234\r\n\
        Content-Disposition: form-data; name=\"files\"\r\n\
        \r\n\
        one\r\n\
        --1234\r\n\
        Content-Disposition: form-data; name=\"files\"\r\n\
        \r\n\
        two\r\n\
        --1234--";

    let mut files = ListTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("files", &mut files).unwrap();
        parser.feed_chunk(body).unwrap();
    }

    assert_eq!(files.values(), &[b"one".to_vec(), b"two".to_vec()]);
}

#[test]
fn unregistered_names_are_discarded_by_default() {
    let body = b"--1234\r\n\
        Content-Disposition: form-data; name=\"unknown\"\r\n\
        \r\n\
        dropped\r\n\
        --1234\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\
        \r\n\
        kept\r\n\
        --1234--";

    let mut a = ValueTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();
        parser.feed_chunk(body).unwrap();
    }

    assert_eq!(a.value(), b"kept");
}

#[test]
fn part_without_content_disposition_is_discarded() {
    let body = b"--1234\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        no name here\r\n\
        --1234\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\
        \r\n\
        named\r\n\
        --1234--";

    let mut a = ValueTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();
        parser.feed_chunk(body).unwrap();
    }

    assert_eq!(a.value(), b"named");
}

#[test]
fn non_form_data_disposition_is_an_error() {
    let body = b"--1234\r\n\
        Content-Disposition: attachment; name=\"a\"\r\n\
        \r\n\
        x\r\n--1234--";

    let mut parser = Parser::new(&form_data_headers()).unwrap();
    let err = parser.feed_chunk(body).unwrap_err();

    assert!(matches!(err, Error::BadContentDisposition(_)));
    assert_eq!(err.class(), ErrorClass::PartHeaders);
}

#[test]
fn leading_crlf_is_tolerated() {
    let mut body = b"\r\n".to_vec();
    body.extend_from_slice(S1_BODY);

    let chunks: Vec<&[u8]> = body.chunks(5).collect();
    let (a, b) = parse_s1_in_chunks(&chunks);

    assert_eq!(a, b"foo");
    assert_eq!(b, b"bar");
}

#[test]
fn garbage_preamble_is_rejected() {
    let mut parser = Parser::new(&form_data_headers()).unwrap();
    let err = parser.feed_chunk(b"preamble--1234\r\n").unwrap_err();

    assert!(matches!(err, Error::BadBoundary { offset: 0 }));
    assert_eq!(err.class(), ErrorClass::Delimiting);
}

#[test]
fn errors_poison_the_parser() {
    let mut a = RecordingTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();

        let err = parser.feed_chunk(b"bogus").unwrap_err();
        assert!(matches!(err, Error::BadBoundary { .. }));

        // same error again, and no target calls for valid-looking input
        let err = parser.feed_chunk(S1_BODY).unwrap_err();
        assert!(matches!(err, Error::BadBoundary { .. }));
    }

    assert!(a.events.is_empty());
}

#[test]
fn failing_target_aborts_the_parse_but_is_finished() {
    let mut a = RecordingTarget::failing();
    let first;
    let second;

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();

        first = parser.feed_chunk(S1_BODY).unwrap_err();
        second = parser.feed_chunk(b"more").unwrap_err();
    }

    assert!(matches!(first, Error::Target(TargetError::Custom(_))));
    assert!(matches!(second, Error::Target(TargetError::Custom(_))));

    // started, never given data, then finished best-effort
    assert_eq!(a.events, vec![Event::Started, Event::Finished]);
}

#[test]
fn oversized_part_fails_validation() {
    let mut parser = Parser::new(&form_data_headers()).unwrap();
    parser
        .register(
            "a",
            ValidatedTarget::new(ValueTarget::new(), MaxSizeValidator::new(2)),
        )
        .unwrap();

    let err = parser.feed_chunk(S1_BODY).unwrap_err();

    assert!(matches!(
        err,
        Error::Target(TargetError::Validation(_))
    ));
}

#[test]
fn dropping_a_parser_mid_part_finishes_active_targets() {
    let mut a = RecordingTarget::new();

    {
        let mut parser = Parser::new(&form_data_headers()).unwrap();
        parser.register("a", &mut a).unwrap();

        // headers plus a piece of the body, but no delimiter yet
        parser
            .feed_chunk(b"--1234\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nfo")
            .unwrap();
    }

    assert_eq!(
        a.events,
        vec![Event::Started, Event::Data(b"fo".to_vec()), Event::Finished]
    );
}

#[test]
fn quoted_boundary_round_trip() {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("multipart/form-data; boundary=\"1234\""),
    );

    let mut a = ValueTarget::new();

    {
        let mut parser = Parser::new(&headers).unwrap();
        parser.register("a", &mut a).unwrap();
        parser.feed_chunk(S1_BODY).unwrap();
    }

    assert_eq!(a.value(), b"foo");
}

#[test]
fn empty_form_terminates_immediately() {
    let mut parser = Parser::new(&form_data_headers()).unwrap();
    parser.feed_chunk(b"--1234--\r\n").unwrap();

    assert!(parser.is_done());
}
