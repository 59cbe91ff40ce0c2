//! Builders for the page-context scripts the engine evaluates.
//!
//! Scripts run in an isolated page realm, so every builder produces a
//! self-contained immediately-invoked expression with no external closures.
//! Locator arguments are JSON-quoted into the script to survive quotes and
//! non-ASCII text.
//!
//! Locators come in two forms: a CSS selector, or `text=<substring>` which
//! matches the visible text of clickable elements (the free-text fallback
//! tier for locale-dependent UI labels).

/// JSON-quote a string for safe embedding in a script.
fn quote(value: &str) -> String {
    // Serializing a &str cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Shared lookup preamble: resolves `locator` into an `el` binding, or
/// `null` when nothing matches.
fn lookup_block(locator: &str) -> String {
    let quoted = quote(locator);
    format!(
        r#"const locator = {quoted};
    let el = null;
    if (locator.indexOf('text=') === 0) {{
        const needle = locator.slice(5);
        const clickables = document.querySelectorAll('button, [role="button"], a');
        for (const candidate of clickables) {{
            if ((candidate.innerText || '').includes(needle)) {{ el = candidate; break; }}
        }}
    }} else {{
        el = document.querySelector(locator);
    }}"#
    )
}

/// Scroll the page to the bottom to reveal more content.
pub fn scroll_to_bottom() -> String {
    r#"(function () {
    window.scrollTo(0, document.body.scrollHeight);
    return true;
})();"#
        .to_string()
}

/// Extract every content unit currently rendered.
///
/// Scans candidate containers with a prioritized list of structural
/// matchers, then best-effort extracts text, image URIs (skipping inline
/// emoji assets), timestamp, author, likes, and comments per container.
/// Containers yielding neither text nor images are skipped. The script
/// returns the full current DOM snapshot, not just newly revealed items --
/// the caller reconciles cycle-over-cycle overlap.
pub fn extract_units() -> String {
    r#"(function () {
    const units = [];
    const containers = document.querySelectorAll(
        '[class*="moment"], [class*="timeline"], [class*="post"]');
    containers.forEach(function (container) {
        try {
            const contentEl = container.querySelector(
                '[class*="content"], [class*="text"], p, span');
            const content = contentEl ? contentEl.innerText.trim() : '';

            const images = [];
            container.querySelectorAll('img').forEach(function (img) {
                if (img.src && !img.src.includes('emoji')) {
                    images.push(img.src);
                }
            });

            const timeEl = container.querySelector('[class*="time"], [class*="date"]');
            const publishTime = timeEl ? timeEl.innerText.trim() : '';

            const authorEl = container.querySelector(
                '[class*="author"], [class*="nickname"], [class*="name"]');
            const author = authorEl ? authorEl.innerText.trim() : '';

            const likes = [];
            container.querySelectorAll('[class*="like"] a, [class*="like"] [class*="name"]')
                .forEach(function (el) {
                    const name = el.innerText.trim();
                    if (name) { likes.push(name); }
                });

            const comments = [];
            container.querySelectorAll('[class*="comment"]').forEach(function (item) {
                const cAuthorEl = item.querySelector(
                    '[class*="author"], [class*="nickname"], [class*="name"]');
                const cContentEl = item.querySelector(
                    '[class*="content"], [class*="text"], span, p');
                const cAuthor = cAuthorEl ? cAuthorEl.innerText.trim() : '';
                const cContent = cContentEl ? cContentEl.innerText.trim() : '';
                if (cAuthor || cContent) {
                    comments.push({ author: cAuthor, content: cContent });
                }
            });

            if (content || images.length > 0) {
                units.push({
                    author: author,
                    content: content,
                    publishTime: publishTime,
                    images: images,
                    likes: likes,
                    comments: comments
                });
            }
        } catch (e) {
            // skip containers that fail to parse
        }
    });
    return units;
})();"#
        .to_string()
}

/// Probe whether a locator currently resolves to a visible element.
///
/// Returns `{visible, x, y, width, height}`; visibility requires a
/// non-empty client rect and neither `display: none` nor
/// `visibility: hidden`.
pub fn probe_visible(locator: &str) -> String {
    format!(
        r#"(function () {{
    {lookup}
    if (!el) {{ return {{ visible: false }}; }}
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const visible = rect.width > 0 && rect.height > 0 &&
        style.display !== 'none' && style.visibility !== 'hidden';
    return {{
        visible: visible,
        x: rect.left,
        y: rect.top,
        width: rect.width,
        height: rect.height
    }};
}})();"#,
        lookup = lookup_block(locator)
    )
}

/// Set an input/textarea value directly and fire the framework-visible
/// events. Used for large payloads where per-key typing is impractical.
pub fn fill_value(locator: &str, text: &str) -> String {
    let quoted_text = quote(text);
    format!(
        r#"(function () {{
    {lookup}
    if (!el) {{ return false; }}
    el.focus();
    el.value = {quoted_text};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})();"#,
        lookup = lookup_block(locator)
    )
}

/// Wait for two clicks in the page and resolve with their coordinates.
/// The bridge awaits the promise, so one evaluation covers the whole
/// sampling interaction.
pub fn sample_region() -> String {
    r#"(function () {
    return new Promise(function (resolve) {
        const points = [];
        function onClick(event) {
            points.push({ x: event.clientX, y: event.clientY });
            if (points.length === 2) {
                document.removeEventListener('click', onClick, true);
                resolve({
                    x1: points[0].x, y1: points[0].y,
                    x2: points[1].x, y2: points[1].y
                });
            }
        }
        document.addEventListener('click', onClick, true);
    });
})();"#
        .to_string()
}
