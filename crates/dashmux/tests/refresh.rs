use dashmux::{
    clock::Clock,
    fetch::{Fetcher, HttpClient},
    refresh::refresh_manifest,
    DashError, DashOptions, Presentation, Session,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dashmux=debug")
        .try_init();
}

fn live_timeline_mpd(repeat: i64, codecs: &str) -> String {
    format!(
        r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="dynamic" availabilityStartTime="2024-01-01T00:00:00Z" minimumUpdatePeriod="PT2S">
             <Period start="PT0S">
               <AdaptationSet contentType="audio">
                 <Representation id="a1" bandwidth="128000" codecs="{codecs}">
                   <SegmentTemplate media="seg-$Number$.m4s" initialization="init.mp4" timescale="1" startNumber="1">
                     <SegmentTimeline>
                       <S t="0" d="2" r="{repeat}"/>
                     </SegmentTimeline>
                   </SegmentTemplate>
                 </Representation>
               </AdaptationSet>
             </Period>
           </MPD>"#
    )
}

fn session_for(server: &MockServer, info: dashmux::PresentationInfo) -> Session {
    let options = DashOptions::default();
    Session {
        info,
        fetcher: Fetcher::new(HttpClient::default(), &options),
        options,
        manifest_url: Url::parse(&format!("{}/live.mpd", server.uri())).unwrap(),
        clock: Clock::new(),
    }
}

async fn mount_manifest(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/live.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// A refresh that appends timeline entries grows `last_seq_no` and leaves
/// the play position untouched. Applying the same manifest again changes
/// nothing (refresh is idempotent).
#[tokio::test]
async fn refresh_extends_timeline() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    let manifest_url = Url::parse(&format!("{}/live.mpd", server.uri()))?;
    let mpd = dash_mpd::parse(&live_timeline_mpd(4, "mp4a.40.2"))?;
    let mut presentation = Presentation::from_mpd(&mpd, &manifest_url, 0, 0)?;
    let mut rep = presentation.audios.remove(0);

    // five segments (1..=5); the reader sits on the newest one
    assert_eq!(rep.first_seq_no, 1);
    rep.cur_seq_no = 5;
    rep.last_seq_no = 5;

    let mut session = session_for(&server, presentation.info);

    // the refreshed manifest carries two more segments
    mount_manifest(&server, live_timeline_mpd(6, "mp4a.40.2")).await;
    refresh_manifest(&mut session, &mut rep).await?;

    assert_eq!(rep.cur_seq_no, 5, "play position must survive the splice");
    assert_eq!(rep.last_seq_no, 7);
    assert_eq!(rep.timelines.len(), 1);
    assert_eq!(rep.timelines[0].repeat, 6);

    // unchanged manifest, unchanged state
    refresh_manifest(&mut session, &mut rep).await?;
    assert_eq!(rep.cur_seq_no, 5);
    assert_eq!(rep.last_seq_no, 7);
    Ok(())
}

/// A representation that changes codecs across a refresh is surfaced as
/// `input changed` and the splice is not applied.
#[tokio::test]
async fn refresh_codec_change() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    let manifest_url = Url::parse(&format!("{}/live.mpd", server.uri()))?;
    let mpd = dash_mpd::parse(&live_timeline_mpd(4, "mp4a.40.2"))?;
    let mut presentation = Presentation::from_mpd(&mpd, &manifest_url, 0, 0)?;
    let mut rep = presentation.audios.remove(0);
    rep.cur_seq_no = 3;
    rep.last_seq_no = 5;

    let mut session = session_for(&server, presentation.info);

    mount_manifest(&server, live_timeline_mpd(6, "ec-3")).await;
    let result = refresh_manifest(&mut session, &mut rep).await;
    assert!(matches!(result, Err(DashError::InputChanged(_))));

    // pre-refresh state is intact
    assert_eq!(rep.cur_seq_no, 3);
    assert_eq!(rep.last_seq_no, 5);
    assert_eq!(rep.codecs.as_deref(), Some("mp4a.40.2"));
    assert_eq!(rep.timelines[0].repeat, 4);
    Ok(())
}

/// A refresh whose manifest lost the representation is an invalid manifest.
#[tokio::test]
async fn refresh_missing_representation() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    let manifest_url = Url::parse(&format!("{}/live.mpd", server.uri()))?;
    let mpd = dash_mpd::parse(&live_timeline_mpd(4, "mp4a.40.2"))?;
    let mut presentation = Presentation::from_mpd(&mpd, &manifest_url, 0, 0)?;
    let mut rep = presentation.audios.remove(0);
    rep.cur_seq_no = 2;
    rep.last_seq_no = 5;

    let mut session = session_for(&server, presentation.info);

    let other = live_timeline_mpd(6, "mp4a.40.2").replace(r#"id="a1""#, r#"id="other""#);
    mount_manifest(&server, other).await;

    let result = refresh_manifest(&mut session, &mut rep).await;
    assert!(matches!(result, Err(DashError::InvalidManifest(_))));
    assert_eq!(rep.cur_seq_no, 2);
    assert_eq!(rep.timelines[0].repeat, 4);
    Ok(())
}

/// Replacing the fragment list adjusts the position by the start-number
/// delta, or rebases entirely when the window moved past it.
#[tokio::test]
async fn refresh_segment_list_window() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;

    let list_mpd = |start_number: u64| {
        format!(
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="dynamic" availabilityStartTime="2024-01-01T00:00:00Z">
                 <Period start="PT0S">
                   <AdaptationSet contentType="audio">
                     <Representation id="a1" bandwidth="64000" codecs="mp4a.40.2">
                       <SegmentList duration="2" timescale="1" startNumber="{start_number}">
                         <SegmentURL media="chunk-{start_number}.m4s"/>
                         <SegmentURL media="chunk-next.m4s"/>
                       </SegmentList>
                     </Representation>
                   </AdaptationSet>
                 </Period>
               </MPD>"#
        )
    };

    let manifest_url = Url::parse(&format!("{}/live.mpd", server.uri()))?;
    let mpd = dash_mpd::parse(&list_mpd(10))?;
    let mut presentation = Presentation::from_mpd(&mpd, &manifest_url, 0, 0)?;
    let mut rep = presentation.audios.remove(0);
    rep.cur_seq_no = 11;
    rep.last_seq_no = 11;

    let mut session = session_for(&server, presentation.info);

    // window slid forward by one: position shifts with it
    mount_manifest(&server, list_mpd(11)).await;
    refresh_manifest(&mut session, &mut rep).await?;
    assert_eq!(rep.start_number, 11);
    assert_eq!(rep.cur_seq_no, 12);
    assert_eq!(rep.last_seq_no, 12);
    Ok(())
}
