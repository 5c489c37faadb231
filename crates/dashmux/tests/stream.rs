use dashmux::{
    clock::Clock,
    fetch::{Fetcher, HttpClient},
    sequencer, DashError, DashOptions, Presentation, Representation, SegmentReader, Session,
};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dashmux=debug")
        .try_init();
}

fn session_for(server: &MockServer, info: dashmux::PresentationInfo) -> Session {
    let options = DashOptions::default();
    Session {
        info,
        fetcher: Fetcher::new(HttpClient::default(), &options),
        options,
        manifest_url: Url::parse(&format!("{}/manifest.mpd", server.uri())).unwrap(),
        clock: Clock::new(),
    }
}

fn vod_template_mpd(base: &str) -> String {
    format!(
        r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT20S" profiles="urn:mpeg:dash:profile:isoff-live:2011">
             <Period start="PT0S">
               <AdaptationSet contentType="video">
                 <Representation id="v1" bandwidth="1000000" width="640" height="360" codecs="avc1.64001e">
                   <BaseURL>{base}/</BaseURL>
                   <SegmentTemplate media="seg-$Number$.m4s" initialization="init.mp4" timescale="1" duration="2" startNumber="1"/>
                 </Representation>
               </AdaptationSet>
             </Period>
           </MPD>"#
    )
}

async fn read_to_end(reader: &mut SegmentReader<'_>) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 16];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// The reader yields the init section once, then all declared segments
/// back to back, then EOF.
#[tokio::test]
async fn vod_template_duration_stream() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/init.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"INITDATA".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    for i in 1..=10 {
        Mock::given(method("GET"))
            .and(path(format!("/seg-{i}.m4s")))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(format!("SEGMENT{i:02}").into_bytes()),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let mpd = dash_mpd::parse(&vod_template_mpd(&server.uri()))?;
    let manifest_url = Url::parse(&format!("{}/manifest.mpd", server.uri()))?;
    let mut presentation = Presentation::from_mpd(&mpd, &manifest_url, 0, 0)?;
    let mut rep = presentation.videos.remove(0);

    let mut session = session_for(&server, presentation.info);
    let now = session.clock.now_secs();
    rep.cur_seq_no = sequencer::calc_cur_seg_no(&rep, &session.info, &session.options, now);
    rep.last_seq_no = sequencer::calc_max_seg_no(&rep, &session.info, &session.options, now);
    assert_eq!(rep.cur_seq_no, 1);
    assert_eq!(rep.last_seq_no, 10);

    let mut reader = SegmentReader::new(&mut session, &mut rep);
    let out = read_to_end(&mut reader).await?;

    let mut expected = b"INITDATA".to_vec();
    for i in 1..=10 {
        expected.extend_from_slice(format!("SEGMENT{i:02}").as_bytes());
    }
    assert_eq!(out, expected);
    // EOF leaves the transient "need next fragment" position
    assert_eq!(rep.cur_seq_no, rep.last_seq_no + 1);

    server.verify().await;
    Ok(())
}

/// A second read after EOF stays at EOF.
#[tokio::test]
async fn vod_eof_is_stable() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/init.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"I".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/seg-1.m4s"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"B".to_vec()))
        .mount(&server)
        .await;

    let mpd = dash_mpd::parse(&vod_template_mpd(&server.uri()))?;
    let manifest_url = Url::parse(&format!("{}/manifest.mpd", server.uri()))?;
    let mut presentation = Presentation::from_mpd(&mpd, &manifest_url, 0, 0)?;
    let mut rep = presentation.videos.remove(0);
    rep.cur_seq_no = 1;
    rep.last_seq_no = 1;

    let mut session = session_for(&server, presentation.info);
    let mut reader = SegmentReader::new(&mut session, &mut rep);
    let out = read_to_end(&mut reader).await?;
    assert_eq!(out, b"IB");

    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).await?, 0);
    assert_eq!(reader.read(&mut buf).await?, 0);
    Ok(())
}

/// Byte ranges from a SegmentList become a single HTTP Range request.
#[tokio::test]
async fn ranged_fragment_requests() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/media.mp4"))
        .and(header("Range", "bytes=100-199"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![7u8; 100]))
        .expect(1)
        .mount(&server)
        .await;

    let options = DashOptions::default();
    let fetcher = Fetcher::new(HttpClient::default(), &options);
    let mut source = fetcher
        .open(&format!("{}/media.mp4", server.uri()), 100, 100)
        .await?;

    let mut buf = [0u8; 256];
    let mut total = 0;
    loop {
        let n = source.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    assert_eq!(total, 100);

    server.verify().await;
    Ok(())
}

/// Oversized manifests are rejected outright.
#[tokio::test]
async fn manifest_size_cap() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    let huge = "x".repeat(60 * 1024);
    Mock::given(method("GET"))
        .and(path("/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(huge))
        .mount(&server)
        .await;

    let client = HttpClient::default();
    let url = Url::parse(&format!("{}/manifest.mpd", server.uri()))?;
    let result = dashmux::manifest::fetch_manifest(&client, &url).await;
    assert!(matches!(result, Err(DashError::InvalidManifest(_))));
    Ok(())
}

/// Byte-level seeking only exists for VOD explicit fragment lists.
#[tokio::test]
async fn byte_seek_gate() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    let mpd = dash_mpd::parse(&vod_template_mpd(&server.uri()))?;
    let manifest_url = Url::parse(&format!("{}/manifest.mpd", server.uri()))?;
    let mut presentation = Presentation::from_mpd(&mpd, &manifest_url, 0, 0)?;
    let mut rep = presentation.videos.remove(0);
    rep.cur_seq_no = 1;
    rep.last_seq_no = 10;

    let mut session = session_for(&server, presentation.info);

    // template style: unsupported
    {
        let mut reader = SegmentReader::new(&mut session, &mut rep);
        assert!(!reader.byte_seek_supported());
        assert!(matches!(
            reader.byte_seek(0).await,
            Err(DashError::SeekNotSupported)
        ));
    }

    // explicit single-fragment list: supported until init bytes exist
    let mut list_rep = Representation::new(dashmux::MediaKind::Video);
    list_rep
        .fragments
        .push(dashmux::Fragment::new(format!("{}/media.mp4", server.uri())));
    list_rep.first_seq_no = 0;
    list_rep.cur_seq_no = 0;
    list_rep.last_seq_no = 0;
    let reader = SegmentReader::new(&mut session, &mut list_rep);
    assert!(reader.byte_seek_supported());
    Ok(())
}
