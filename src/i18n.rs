//! Message table for the four supported UI languages.
//!
//! The table is built once and never mutated; lookups fall back to Japanese
//! key by key, and to the key itself when even that is missing.

use std::collections::HashMap;

use axum::{
    extract::Query,
    http::{header, HeaderValue, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub const LANG_COOKIE: &str = "lang";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Locale {
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh-Hant")]
    ZhHant,
    #[serde(rename = "zh-Hans")]
    ZhHans,
}

impl Locale {
    pub const ALL: [Locale; 4] = [Locale::Ja, Locale::En, Locale::ZhHant, Locale::ZhHans];

    /// Accepts the canonical tags and a few legacy aliases; anything else is `ja`.
    pub fn normalize(tag: &str) -> Locale {
        match tag.trim() {
            "en" => Locale::En,
            "zh-Hant" | "zh" | "zh_TW" | "zh-TW" | "tw" => Locale::ZhHant,
            "zh-Hans" | "zh_CN" | "zh-CN" | "cn" => Locale::ZhHans,
            _ => Locale::Ja,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Locale::Ja => "ja",
            Locale::En => "en",
            Locale::ZhHant => "zh-Hant",
            Locale::ZhHans => "zh-Hans",
        }
    }

    pub fn from_jar(jar: &CookieJar) -> Locale {
        jar.get(LANG_COOKIE)
            .map(|c| Locale::normalize(c.value()))
            .unwrap_or(Locale::Ja)
    }

    fn column(&self) -> usize {
        match self {
            Locale::Ja => 0,
            Locale::En => 1,
            Locale::ZhHant => 2,
            Locale::ZhHans => 3,
        }
    }
}

// key, [ja, en, zh-Hant, zh-Hans]; "" marks a missing translation
const STRINGS: &[(&str, [&str; 4])] = &[
    ("app_title", ["旅行管理", "Travel Manager", "旅行管理", "旅行管理"]),
    ("trip_list", ["旅行一覧", "Trips", "旅行列表", "旅行列表"]),
    ("items", ["旅程項目", "Itinerary Items", "行程項目", "行程项目"]),
    ("login", ["ログイン", "Login", "登入", "登录"]),
    ("logout", ["ログアウト", "Logout", "登出", "退出"]),
    ("register", ["新規登録", "Sign up", "註冊", "注册"]),
    (
        "sort_hint",
        [
            "旅行/項目をドラッグして並べ替えできます。離すと自動保存されます。",
            "Drag trips/items to reorder. Changes save automatically.",
            "旅行/項目可拖曳調整順序，放開即自動儲存。",
            "旅行/项目可拖拽调整顺序，放开即自动保存。",
        ],
    ),
    ("hint_login_id", ["英数字 5～20 文字", "Alphanumeric 5–20 chars", "英數 5–20 字元", "英数 5–20 字符"]),
    ("hint_password", ["8～20 文字", "8–20 chars", "8–20 字元", "8–20 字符"]),
    (
        "code_hint",
        [
            "メールに届いた6桁コード（15分で無効）",
            "6-digit code from email (expires in 15 min)",
            "Email 6碼驗證碼（15分鐘內有效）",
            "Email 6位验证码（15分钟内有效）",
        ],
    ),
    (
        "code_sent",
        [
            "認証コードを送信しました。メールを確認してください。",
            "Verification code has been sent. Please check your email.",
            "已寄出驗證碼到您提供的電郵地址，請查收。",
            "已发送验证码到您提供的电子邮箱，请查收。",
        ],
    ),
    ("mail_subject", ["メール認証", "Email verification", "郵件驗證", "邮件验证"]),
    (
        "mail_body",
        [
            "認証コード: {code}（{minutes}分間有効）",
            "Your verification code is: {code} (valid for {minutes} minutes)",
            "您的驗證碼：{code}（{minutes} 分鐘內有效）",
            "您的验证码：{code}（{minutes} 分钟内有效）",
        ],
    ),
    (
        "err_login_bad",
        ["ID またはパスワードが違います。", "Invalid ID or password.", "ID 或密碼錯誤。", "ID 或密码错误。"],
    ),
    (
        "err_login_required",
        ["ログインしてください。", "Please log in.", "請先登入。", "请先登录。"],
    ),
    (
        "err_id_used",
        [
            "この Login ID は既に使用されています。",
            "Login ID already in use.",
            "此 Login ID 已被使用。",
            "该 Login ID 已被使用。",
        ],
    ),
    (
        "err_id_format",
        [
            "Login ID は英数字 5～20 文字で入力してください。",
            "Login ID must be alphanumeric (5–20 chars).",
            "Login ID 需為英數 5–20 字元。",
            "Login ID 须为英数 5–20 字符。",
        ],
    ),
    (
        "error_password_mismatch",
        [
            "パスワードが一致しないか、長さが不正です（8～20 文字）。",
            "Passwords do not match or are not 8–20 chars.",
            "密碼不一致或長度不符（8–20 字元）。",
            "密码不一致或长度不符（8–20 字符）。",
        ],
    ),
    (
        "error_email_mismatch",
        [
            "メールが一致しないか、形式が不正です。",
            "Emails do not match or are malformed.",
            "Email 不一致或格式不正確。",
            "Email 不一致或格式不正确。",
        ],
    ),
    (
        "error_code_invalid_or_expired",
        ["認証コードが無効または期限切れです。", "Code invalid or expired.", "驗證碼無效或已過期。", "验证码无效或已过期。"],
    ),
    (
        "err_email_used",
        ["このメールは既に使用されています。", "Email already in use.", "此 Email 已被使用。", "该 Email 已被使用。"],
    ),
    (
        "err_code_resend_wait",
        ["再送信はしばらくお待ちください。", "Please wait before resending.", "請稍候再重送。", "请稍候再重送。"],
    ),
    (
        "err_mail_failed",
        [
            "送信に失敗しました。後でもう一度お試しください。",
            "Failed to send. Please try again later.",
            "寄送失敗，請稍後再試。",
            "发送失败，请稍后再试。",
        ],
    ),
    ("err_title_required", ["タイトルを入力してください。", "Title is required.", "請輸入標題。", ""]),
    (
        "err_title_too_long",
        [
            "タイトルは200文字以内で入力してください。",
            "Title must be at most 200 characters.",
            "標題最多 200 個字元。",
            "标题最多 200 个字符。",
        ],
    ),
    (
        "err_time_too_long",
        [
            "時刻は20文字以内で入力してください。",
            "Time must be at most 20 characters.",
            "時間最多 20 個字元。",
            "时间最多 20 个字符。",
        ],
    ),
    (
        "err_invalid_date",
        ["日付は YYYY-MM-DD で入力してください。", "Dates must be YYYY-MM-DD.", "", ""],
    ),
    ("err_not_found", ["見つかりません。", "Not found.", "找不到資料。", "找不到数据。"]),
    (
        "err_internal",
        [
            "サーバーエラーが発生しました。",
            "Something went wrong on our side.",
            "伺服器發生錯誤。",
            "服务器发生错误。",
        ],
    ),
];

lazy_static! {
    static ref TABLE: HashMap<&'static str, [&'static str; 4]> = STRINGS.iter().copied().collect();
}

/// Localized text for `key`.
pub fn text(locale: Locale, key: &'static str) -> &'static str {
    match TABLE.get(key) {
        Some(row) => {
            let localized = row[locale.column()];
            if localized.is_empty() {
                row[Locale::Ja.column()]
            } else {
                localized
            }
        }
        None => key,
    }
}

/// Every key resolved for one locale.
pub fn catalog(locale: Locale) -> HashMap<&'static str, &'static str> {
    TABLE.keys().map(|&key| (key, text(locale, key))).collect()
}

#[derive(Debug, Deserialize)]
pub struct LangQuery {
    #[serde(alias = "code")]
    pub set: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub lang: Locale,
    pub strings: HashMap<&'static str, &'static str>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lang", get(set_lang))
        .route("/i18n", get(get_catalog))
}

/// `next` when it is a path on this site, `/` otherwise. Anything a browser
/// could read as another origin is refused: `//host`, `/\host`, schemes,
/// control characters.
pub(crate) fn local_redirect_target(next: Option<&str>) -> HeaderValue {
    let fallback = HeaderValue::from_static("/");
    let Some(next) = next else {
        return fallback;
    };
    let mut chars = next.chars();
    if chars.next() != Some('/') || matches!(chars.next(), Some('/' | '\\')) {
        return fallback;
    }
    if next.chars().any(|c| c == '\\' || c.is_control() || c.is_whitespace()) {
        return fallback;
    }
    match next.parse::<Uri>() {
        Ok(uri) if uri.scheme().is_none() && uri.authority().is_none() => {
            HeaderValue::from_str(next).unwrap_or(fallback)
        }
        _ => fallback,
    }
}

/// Stores the chosen language and sends the browser back to a local path.
pub async fn set_lang(jar: CookieJar, Query(q): Query<LangQuery>) -> impl IntoResponse {
    let locale = Locale::normalize(q.set.as_deref().unwrap_or_default());
    let back = local_redirect_target(q.next.as_deref());

    let cookie = Cookie::build((LANG_COOKIE, locale.tag()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(365))
        .build();
    (StatusCode::SEE_OTHER, jar.add(cookie), [(header::LOCATION, back)])
}

pub async fn get_catalog(jar: CookieJar) -> Json<CatalogResponse> {
    let lang = Locale::from_jar(&jar);
    Json(CatalogResponse {
        lang,
        strings: catalog(lang),
    })
}
