//! Sample trip every new account starts with.

use crate::store::{ItemFields, SeedTrip, TripFields};

const ITEMS: [(&str, &str, &str); 6] = [
    ("松山城", "10:00", "ロープウェイ＋松山城観光"),
    ("ロープウェイ街", "12:00", "ランチ（昼食）"),
    (
        "道後温泉 本館",
        "14:00",
        "日本最古といわれる共同浴場で、歴史情緒あふれる温泉を楽しめます",
    ),
    (
        "道後商店街（道後ハイカラ通り）",
        "16:00",
        "温泉街を散策し、お土産やご当地グルメを楽しめます",
    ),
    ("宿泊先の旅館でチェックイン", "17:00", "旅館で晩ご飯"),
    (
        "夜散歩",
        "19:00",
        "ライトアップされた道後温泉本館を眺めながら街歩き",
    ),
];

pub fn sample_trip() -> SeedTrip {
    SeedTrip {
        trip: TripFields {
            title: "道後温泉小旅行（サンプル）".into(),
            description: Some("松山・道後温泉の1泊2日プラン".into()),
            start_date: None,
            end_date: None,
        },
        items: ITEMS
            .iter()
            .map(|(title, time, note)| ItemFields {
                title: (*title).into(),
                date: None,
                time: Some((*time).into()),
                note: Some((*note).into()),
            })
            .collect(),
    }
}
