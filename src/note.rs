use scraper::Html;

/// 插入到欄位的 `<img>` 標籤
pub fn image_tag(filename: &str) -> String {
    format!(r#"<img src="{}">"#, escape_attr(filename))
}

/// 把圖片加到欄位原本的內容後面；空白欄位則直接放圖片
pub fn insert_image(current_html: &str, filename: &str) -> String {
    let tag = image_tag(filename);

    if current_html.trim().is_empty() {
        tag
    } else {
        format!("{}<br>{}", current_html, tag)
    }
}

/// 去掉欄位裡的 HTML，得到搜尋用的純文字
pub fn plain_query(field_html: &str) -> String {
    let fragment = Html::parse_fragment(field_html);
    let text: String = fragment.root_element().text().collect();

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
