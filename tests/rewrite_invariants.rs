//! Structural properties every rewrite must hold, over a small corpus of real-world shapes

use std::collections::HashSet;
use std::sync::Arc;

use rstest::rstest;

use stream_cleaner::config::Config;
use stream_cleaner::manifest::{EMPTY_STREAM_MANIFEST, ManifestRewriter, parse};
use stream_cleaner::services::{EngineContext, ManifestSource, StreamCleaner};

const STITCHED: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:1000
#EXT-X-TWITCH-ELAPSED-SECS:1200.0
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:00.000Z
#EXTINF:2.000,live
https://video-edge.example/v1/segment/live1000.ts
#EXT-X-DATERANGE:ID=\"stitched-ad-1714564802-30\",CLASS=\"twitch-stitched-ad\",START-DATE=\"2024-05-01T12:00:02.000Z\",DURATION=30.0
#EXTINF:2.000,Amazon|123456
https://video-edge.example/v1/segment/adsegment1.ts
#EXTINF:2.000,Amazon|123456
https://video-edge.example/v1/segment/adsegment2.ts
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:32.000Z
#EXTINF:2.000,live
https://video-edge.example/v1/segment/live1016.ts
#EXTINF:2.000,live
https://video-edge.example/v1/segment/live1017.ts
";

/// Live edge around a stitched break: PDT on every segment, discontinuities
/// around the ad, ad titles but no ad URL markers
const TWITCH_BREAK: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:2040
#EXT-X-TWITCH-ELAPSED-SECS:4080.000
#EXT-X-TWITCH-TOTAL-SECS:4092.000
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:00.000Z
#EXTINF:2.000,live
https://video-edge.example/v1/segment/CuYD2040.ts
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:02.000Z
#EXTINF:2.000,live
https://video-edge.example/v1/segment/CuYD2041.ts
#EXT-X-DATERANGE:ID=\"stitched-ad-1714564804-2\",CLASS=\"twitch-stitched-ad\",START-DATE=\"2024-05-01T12:00:04.000Z\",DURATION=4.000,X-TV-TWITCH-AD-POD-LENGTH=\"1\"
#EXT-X-DISCONTINUITY
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:04.000Z
#EXTINF:2.000,Amazon|3079841103
https://video-edge.example/v1/segment/CqAF0.ts
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:06.000Z
#EXTINF:2.000,Amazon|3079841103
https://video-edge.example/v1/segment/CqAF1.ts
#EXT-X-DISCONTINUITY
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:08.000Z
#EXTINF:2.000,live
https://video-edge.example/v1/segment/CuYD2044.ts
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:10.000Z
#EXTINF:2.000,live
https://video-edge.example/v1/segment/CuYD2045.ts
";

const SCTE: &str = "#EXTM3U
#EXT-X-TARGETDURATION:5
#EXT-X-MEDIA-SEQUENCE:1
#EXTINF:4.004,
main1.ts
#EXT-X-CUE-OUT:DURATION=15
#EXTINF:4.004,
break1.ts
#EXTINF:4.004,
break2.ts
#EXT-X-CUE-IN
#EXTINF:4.004,
main2.ts
#EXT-X-SCTE35:CUE=\"/DA0AAAA\"
#EXTINF:4.004,
break3.ts
#EXT-X-SCTE35:CUE=\"/DA0AAAB\",CUE-IN=YES
#EXTINF:4.004,
main3.ts
";

const URL_ONLY: &str = "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXTINF:4.0,
live/seg1.ts
#EXTINF:4.0,
https://ads.doubleclick.example/creative/1.ts
#EXTINF:4.0,
https://cdn.example/ads/break/2.ts
#EXTINF:4.0,
live/seg2.ts
";

const MESSY: &str = "\u{feff}#EXTM3U\r\n\r\n\r\n#EXT-X-TARGETDURATION:2\r\n#EXTINF:2.0,\r\n\r\nlive1.ts\r\n\r\n\r\n#EXTINF:2.0,\r\nlive2.ts\r\nstray.ts\r\n#EXTINF:2.0,\r\n";

const CLEAN: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:2
#EXT-X-MEDIA-SEQUENCE:42
#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:00.000Z
#EXTINF:2.000,live
seg42.ts
#EXTINF:2.000,live
seg43.ts
#EXTINF:1.500,live
seg44.ts
";

const AD_ONLY: &str = "#EXTM3U
#EXT-X-DATERANGE:ID=\"stitched-ad-1\",CLASS=\"twitch-stitched-ad\",START-DATE=\"2024-05-01T12:00:00Z\"
#EXT-X-CUE-OUT:30
";

fn rewriter() -> ManifestRewriter {
    ManifestRewriter::from_config(&Config::default())
}

fn header_count(text: &str) -> usize {
    parse(text).segment_header_count()
}

fn media_uris(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[rstest]
#[case::stitched(STITCHED)]
#[case::twitch_break(TWITCH_BREAK)]
#[case::scte(SCTE)]
#[case::url_only(URL_ONLY)]
#[case::messy(MESSY)]
#[case::clean(CLEAN)]
#[case::ad_only(AD_ONLY)]
fn every_header_keeps_its_reference(#[case] input: &str) {
    let out = rewriter().rewrite(input).text;
    assert_eq!(header_count(&out), media_uris(&out).len(), "output:\n{out}");
}

#[rstest]
#[case::stitched(STITCHED)]
#[case::twitch_break(TWITCH_BREAK)]
#[case::scte(SCTE)]
#[case::url_only(URL_ONLY)]
#[case::messy(MESSY)]
#[case::clean(CLEAN)]
fn rewriting_never_adds_media(#[case] input: &str) {
    let before: HashSet<String> = media_uris(input).into_iter().collect();
    let out = rewriter().rewrite(input).text;
    for uri in media_uris(&out) {
        assert!(before.contains(&uri), "{uri} was not in the input");
    }
}

#[rstest]
#[case::stitched(STITCHED)]
#[case::scte(SCTE)]
#[case::url_only(URL_ONLY)]
#[case::messy(MESSY)]
fn output_is_stable_under_a_second_pass(#[case] input: &str) {
    let first = rewriter().rewrite(input).text;
    let second = rewriter().rewrite(&first);
    assert_eq!(second.text, first);
    assert_eq!(second.segments_removed, 0);
}

#[rstest]
#[case::stitched(STITCHED)]
#[case::scte(SCTE)]
#[case::url_only(URL_ONLY)]
fn no_ad_markup_survives(#[case] input: &str) {
    let out = rewriter().rewrite(input).text;
    for needle in ["stitched-ad", "CUE-OUT", "CUE-IN", "SCTE35", "adsegment", "doubleclick", "/ads/"] {
        assert!(!out.contains(needle), "{needle} survived:\n{out}");
    }
    assert!(out.starts_with("#EXTM3U\n"));
}

#[test]
fn stitched_break_is_cut_at_program_date_time() {
    let outcome = rewriter().rewrite(STITCHED);
    assert_eq!(
        media_uris(&outcome.text),
        vec![
            "https://video-edge.example/v1/segment/live1000.ts",
            "https://video-edge.example/v1/segment/live1016.ts",
            "https://video-edge.example/v1/segment/live1017.ts",
        ]
    );
    assert!(outcome.text.contains("#EXT-X-PROGRAM-DATE-TIME:2024-05-01T12:00:32.000Z"));
    assert!(outcome.text.contains("#EXT-X-TWITCH-ELAPSED-SECS:1200.0"));
    assert_eq!(outcome.segments_removed, 2);
    assert!(!outcome.unterminated_ad_block);
}

#[test]
fn cue_and_scte_breaks_end_at_their_closing_tag() {
    let outcome = rewriter().rewrite(SCTE);
    assert_eq!(media_uris(&outcome.text), vec!["main1.ts", "main2.ts", "main3.ts"]);
    assert!(!outcome.unterminated_ad_block);
    assert_eq!(outcome.segments_removed, 3);
    // Live segments share a manifest with ad metadata
    assert_eq!(outcome.suspicious_kept, 3);
}

#[test]
fn url_markers_remove_segments_without_metadata() {
    let outcome = rewriter().rewrite(URL_ONLY);
    assert_eq!(media_uris(&outcome.text), vec!["live/seg1.ts", "live/seg2.ts"]);
    assert_eq!(outcome.segments_removed, 2);
    assert!(!outcome.ad_markers_seen);
}

#[test]
fn messy_input_is_normalised() {
    let outcome = rewriter().rewrite(MESSY);
    assert_eq!(
        outcome.text,
        "#EXTM3U\n\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\nlive1.ts\n\n#EXTINF:2.0,\nlive2.ts\n"
    );
}

#[test]
fn clean_manifests_are_returned_verbatim() {
    let outcome = rewriter().rewrite(CLEAN);
    assert_eq!(outcome.text, CLEAN);
    assert!(!outcome.needs_probe());
}

#[test]
fn ad_only_manifest_becomes_an_empty_stream() {
    let outcome = rewriter().rewrite(AD_ONLY);
    assert_eq!(outcome.text, EMPTY_STREAM_MANIFEST);
    assert!(!outcome.text.contains("#EXT-X-ENDLIST"));
    assert!(outcome.needs_probe());
}

#[tokio::test]
async fn twitch_break_is_served_with_segments() {
    let engine = StreamCleaner::new(
        rewriter(),
        None,
        Arc::new(EngineContext::in_memory()),
    );

    let processed = engine.process(TWITCH_BREAK, None).await;
    let body = &processed.body;

    // Ad metadata plus discontinuities flag every segment, live ones included
    assert_eq!(processed.outcome.segments_kept, 0);
    assert_eq!(processed.source, ManifestSource::MarkupStripped);

    assert_eq!(header_count(body), media_uris(body).len());
    assert!(header_count(body) > 0, "no segments left:\n{body}");
    for live in ["CuYD2040.ts", "CuYD2041.ts", "CuYD2044.ts", "CuYD2045.ts"] {
        assert!(body.contains(live), "{live} missing:\n{body}");
    }
    assert!(!body.contains("DATERANGE"));
    assert!(!body.contains("stitched-ad"));
    assert!(!body.contains("X-TV-TWITCH-AD"));
    assert!(body.contains("#EXT-X-MEDIA-SEQUENCE:2040"));
}
