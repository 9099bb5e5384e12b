use std::convert::Infallible;
use std::path::PathBuf;

use bytes::Bytes;
use formstream::{decode, Expect, Form, FormDecoder, Limit, Limits, Options, Seed, Stored};
use futures_util::stream::{self, Stream};
use serde_json::json;

const CONTENT_TYPE: &str = "multipart/form-data; boundary=X-BOUNDARY";

fn char_stream(data: &str) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin + Send {
    let chunks: Vec<Result<Bytes, Infallible>> = data
        .chars()
        .map(|ch| Ok(Bytes::copy_from_slice(ch.to_string().as_bytes())))
        .collect();
    stream::iter(chunks)
}

fn chunked(data: Vec<u8>, size: usize) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin + Send {
    let chunks: Vec<Result<Bytes, Infallible>> = data.chunks(size).map(|chunk| Ok(Bytes::copy_from_slice(chunk))).collect();
    stream::iter(chunks)
}

fn field(name: &str, value: &str) -> String {
    format!(
        "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
        name, value
    )
}

fn file_header(name: &str, filename: &str) -> String {
    format!(
        "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        name, filename
    )
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("formstream-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn test_multipart_basic() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";
    let config = Options::new().content_type(CONTENT_TYPE).resolve();

    let form = decode(char_stream(data), &config).await.unwrap();

    assert_eq!(serde_json::to_value(&form.vars).unwrap(), json!({ "My Field": "abcd" }));

    let file = form.files["File Field"].as_value().unwrap();
    assert_eq!(file.filename, "a-text-file.txt");
    assert_eq!(file.mime_type, "text/plain");
    assert_eq!(
        file.stored,
        Stored::Memory(Bytes::from_static(b"Hello world\nHello\r\nWorld\rAgain"))
    );
}

#[tokio::test]
async fn test_multipart_empty() {
    let config = Options::new().content_type(CONTENT_TYPE).resolve();
    let form = decode(char_stream("--X-BOUNDARY--\r\n"), &config).await.unwrap();

    assert!(form.is_empty());
}

#[tokio::test]
async fn test_repeated_names_keep_order() {
    let data = format!(
        "{}{}{}{}--X-BOUNDARY--\r\n",
        field("arr", "a"),
        field("arr", "b"),
        field("arr", "c"),
        field("obj[key][]", "v")
    );
    let config = Options::new().content_type(CONTENT_TYPE).resolve();

    let form = decode(char_stream(&data), &config).await.unwrap();

    assert_eq!(
        serde_json::to_value(&form.vars).unwrap(),
        json!({ "arr": ["a", "b", "c"], "obj": { "key": ["v"] } })
    );
}

#[tokio::test]
async fn test_count_limits_are_all_or_nothing() {
    let data = format!(
        "{}{}{}somefile\r\n--X-BOUNDARY--\r\n",
        field("a", "1"),
        field("b", "2"),
        file_header("upload", "some.bin")
    );

    let cases = vec![
        (Limits::new().fields(1), Limit::Fields),
        (Limits::new().parts(2), Limit::Parts),
        (Limits::new().files(0), Limit::Files),
    ];

    for (limits, expected) in cases {
        let config = Options::new().content_type(CONTENT_TYPE).limits(limits).resolve();
        let err = decode(char_stream(&data), &config).await.unwrap_err();

        assert_eq!(err.limit(), Some(expected));
        assert_eq!(err.to_string(), expected.description());
    }
}

#[tokio::test]
async fn test_oversized_file_is_truncated() {
    let data = format!("{}0123456789\r\n--X-BOUNDARY--\r\n", file_header("upload", "big.bin"));
    let config = Options::new()
        .content_type(CONTENT_TYPE)
        .limits(Limits::new().file_size(4))
        .resolve();

    let form = decode(char_stream(&data), &config).await.unwrap();

    let file = form.files["upload"].as_value().unwrap();
    assert!(file.truncated);
    assert_eq!(file.content(), Some(&Bytes::from_static(b"0123")));
}

#[tokio::test]
async fn test_files_saved_to_disk() {
    let dir = scratch_dir("disk");
    let data = format!(
        "{}hello from disk\r\n{}--X-BOUNDARY--\r\n",
        file_header("docs[]", "../../notes.txt"),
        field("title", "notes")
    );
    let config = Options::new().content_type(CONTENT_TYPE).save(&dir).resolve();

    let form = decode(char_stream(&data), &config).await.unwrap();

    let files = form.files["docs"].as_list().unwrap();
    assert_eq!(files.len(), 1);

    let file = files[0].as_ref().and_then(|val| val.as_value()).unwrap();
    assert_eq!(file.filename, "notes.txt");

    let path = file.path().unwrap();
    assert_eq!(path.parent(), Some(dir.as_path()));
    assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("txt"));
    assert_eq!(std::fs::read(path).unwrap(), b"hello from disk");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_completion_waits_for_every_save() {
    let dir = scratch_dir("completion");
    let payload: Vec<u8> = (0..200 * 1024).map(|i| (i % 251) as u8).collect();

    let mut data = Vec::new();
    for idx in 0..3 {
        data.extend_from_slice(file_header("uploads", &format!("part-{}.bin", idx)).as_bytes());
        data.extend_from_slice(&payload);
        data.extend_from_slice(b"\r\n");
    }
    data.extend_from_slice(field("after", "files").as_bytes());
    data.extend_from_slice(b"--X-BOUNDARY--\r\n");

    let config = Options::new().content_type(CONTENT_TYPE).save(&dir).resolve();
    let form = decode(chunked(data, 8 * 1024), &config).await.unwrap();

    let files: Vec<_> = form.files["uploads"].values().collect();
    assert_eq!(files.len(), 3);

    for file in files {
        let written = std::fs::read(file.path().unwrap()).unwrap();
        assert_eq!(written.len(), payload.len());
        assert_eq!(written, payload);
    }
    assert_eq!(serde_json::to_value(&form.vars).unwrap(), json!({ "after": "files" }));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_expectation_gates_collections() {
    let data = format!(
        "{}{}contents\r\n--X-BOUNDARY--\r\n",
        field("name", "ada"),
        file_header("avatar", "me.png")
    );

    let only_files = Options::new().content_type(CONTENT_TYPE).expect(Expect::new().files(json!({})));
    let form = decode(char_stream(&data), &only_files.resolve()).await.unwrap();
    assert!(form.vars.is_empty());
    assert_eq!(form.files.len(), 1);

    let only_vars = Options::new().content_type(CONTENT_TYPE).expect(Expect::new().vars(json!({})));
    let form = decode(char_stream(&data), &only_vars.resolve()).await.unwrap();
    assert!(form.files.is_empty());
    assert_eq!(serde_json::to_value(&form.vars).unwrap(), json!({ "name": "ada" }));
}

#[tokio::test]
async fn test_field_value_length_is_rejected() {
    let data = format!("{}--X-BOUNDARY--\r\n", field("bio", "far too long"));
    let config = Options::new()
        .content_type(CONTENT_TYPE)
        .limits(Limits::new().field_value_length(3))
        .resolve();

    let err = decode(char_stream(&data), &config).await.unwrap_err();
    assert_eq!(err.limit(), Some(Limit::FieldSize));
    assert_eq!(err.to_string(), Limit::FieldSize.description());
}

#[tokio::test]
async fn test_seed_factory_is_fresh_per_decode() {
    let decoder = FormDecoder::with_options(Options::new().result(Seed::factory(|| {
        let mut form = Form::new();
        formstream::append_field(&mut form.vars, "tags[]", "seeded".to_owned());
        form
    })));

    for _ in 0..2 {
        let form = decoder.parse("tags[]=given".into(), Options::new()).await.unwrap();
        assert_eq!(
            serde_json::to_value(&form.vars).unwrap(),
            json!({ "tags": ["seeded", "given"] })
        );
    }
}

#[tokio::test]
async fn test_parse_text_defaults_to_urlencoded() {
    let form = FormDecoder::new()
        .parse("greeting=hello%20world&n[]=1&n[]=2".into(), Options::new())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&form).unwrap()["vars"],
        json!({ "greeting": "hello world", "n": ["1", "2"] })
    );
}

#[tokio::test]
async fn test_unterminated_body_is_an_error() {
    let data = format!("{}--X-BOUN", field("a", "1"));
    let config = Options::new().content_type(CONTENT_TYPE).resolve();

    let err = decode(char_stream(&data), &config).await.unwrap_err();
    assert_eq!(
        err,
        formstream::Error::IncompleteFieldData {
            field_name: "a".to_owned()
        }
    );
}

#[tokio::test]
async fn test_transfer_encoding_header_is_recorded() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"blob\"; filename=\"raw.bin\"\r\nContent-Type: application/octet-stream\r\nContent-Transfer-Encoding: binary\r\n\r\nraw\r\n--X-BOUNDARY--\r\n";
    let config = Options::new().content_type(CONTENT_TYPE).resolve();

    let form = decode(char_stream(data), &config).await.unwrap();

    let file = form.files["blob"].as_value().unwrap();
    assert_eq!(file.encoding, "binary");
    assert_eq!(file.content(), Some(&Bytes::from_static(b"raw")));
}

#[tokio::test]
async fn test_rejected_body_leaves_no_saved_files() {
    let dir = scratch_dir("rejected");
    let data = format!(
        "{}saved before the rejection\r\n{}{}--X-BOUNDARY--\r\n",
        file_header("upload", "early.bin"),
        field("a", "1"),
        field("b", "2")
    );
    let config = Options::new()
        .content_type(CONTENT_TYPE)
        .save(&dir)
        .limits(Limits::new().fields(1))
        .resolve();

    let err = decode(char_stream(&data), &config).await.unwrap_err();
    assert_eq!(err.limit(), Some(Limit::Fields));
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_deeply_nested_multipart_name_is_flat() {
    let name = format!("a{}", "[b]".repeat(2_600));
    let data = format!("{}--X-BOUNDARY--\r\n", field(&name, "1"));
    let config = Options::new().content_type(CONTENT_TYPE).resolve();

    let form = decode(chunked(data.into_bytes(), 512), &config).await.unwrap();

    assert_eq!(form.vars.len(), 1);
    assert_eq!(form.vars[&name].as_value().map(String::as_str), Some("1"));
}
