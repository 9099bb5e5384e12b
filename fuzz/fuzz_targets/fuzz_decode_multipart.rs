#![no_main]

use std::convert::Infallible;

use formstream::{decode, Limits, Options};
use futures_util::stream;
use libfuzzer_sys::fuzz_target;
use tokio::runtime;

fuzz_target!(|data: &[u8]| {
    // The first byte picks the chunk size so that boundaries land at every offset.
    let (size, body) = match data.split_first() {
        Some((size, body)) => (usize::from(*size).max(1), body),
        None => return,
    };

    let chunks: Vec<Result<Vec<u8>, Infallible>> = body.chunks(size).map(|chunk| Ok(chunk.to_vec())).collect();

    let config = Options::new()
        .content_type("multipart/form-data; boundary=X-BOUNDARY")
        .limits(Limits::new().parts(64).file_size(64 * 1024))
        .resolve();

    let rt = runtime::Builder::new_current_thread().build().expect("runtime");
    rt.block_on(async {
        let _ = decode(stream::iter(chunks), &config).await;
    })
});
