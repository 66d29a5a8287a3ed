use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::screenshots::ScreenshotArchive;
use super::webdriver::{BrowserError, By, ElementRef, WebDriver};
use crate::config::SiteCredentials;
use crate::errors::PipelineError;
use crate::identifier::IdentifierMatcher;
use crate::pipeline::{AuthError, UploadDriver};
use crate::store::UuidMap;

const DEFAULT_WAIT: Duration = Duration::from_secs(20);
const NAVIGATION_WAIT: Duration = Duration::from_secs(10);
const BANNER_WAIT: Duration = Duration::from_secs(1);
const MAX_LOCK_RESUBMITS: u32 = 3;

const SAVE_BUTTON_XPATHS: [&str; 4] = [
    "//input[@data-drupal-selector='edit-submit' and @value='Save']",
    "//input[@id='edit-submit' and @name='op']",
    "//input[contains(@class, 'button--primary') and @value='Save']",
    "//*[@id='edit-submit']",
];
const FILE_LOCK_XPATH: &str = "//div[@role='contentinfo' and contains(@class, 'messages--error')]\
    //div[contains(text(), 'File already locked for writing')]";
pub const IDENTIFIER_FIELD_XPATH: &str = "//div[@property='dcterms:identifier']";
const MEDIA_TAB_XPATH: &str = "//a[contains(@href, '/media') and contains(text(), 'Media')]";
const MEDIA_LINK_XPATH: &str = "//a[contains(@href, '/media/')]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    ExtractedText,
}

impl MediaKind {
    fn label(self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::ExtractedText => "Extracted Text",
        }
    }

    fn path_segment(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::ExtractedText => "extracted-text",
        }
    }

    fn stage(self) -> &'static str {
        match self {
            Self::Document => "pdf_media_upload",
            Self::ExtractedText => "txt_media_upload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUrls {
    pub pdf: String,
    pub txt: String,
}

/// A failed UI step, labelled for the screenshot and the stored error.
#[derive(Debug, Error)]
#[error("{stage}: {message}")]
struct StageError {
    stage: &'static str,
    message: String,
}

trait AtStage<T> {
    fn at(self, stage: &'static str) -> Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T, BrowserError> {
    fn at(self, stage: &'static str) -> Result<T, StageError> {
        self.map_err(|err| StageError {
            stage,
            message: err.to_string(),
        })
    }
}

/// Uploads transcripts through the library's admin UI.
pub struct LibraryUploader {
    browser: WebDriver,
    credentials: SiteCredentials,
    uuid_map: UuidMap,
    matcher: IdentifierMatcher,
    screenshots: ScreenshotArchive,
}

impl LibraryUploader {
    pub fn new(
        browser: WebDriver,
        credentials: SiteCredentials,
        uuid_map: UuidMap,
        matcher: IdentifierMatcher,
        screenshots: ScreenshotArchive,
    ) -> Self {
        Self {
            browser,
            credentials,
            uuid_map,
            matcher,
            screenshots,
        }
    }

    pub fn close(mut self) {
        self.browser.close();
        info!("browser closed");
    }

    fn capture(&self, label: &str) {
        let saved = self
            .browser
            .screenshot_png()
            .map_err(anyhow::Error::from)
            .and_then(|png| self.screenshots.save(label, &png));
        match saved {
            Ok(path) => warn!(path = %path.display(), "saved error screenshot"),
            Err(err) => warn!(error = %err, "could not capture error screenshot"),
        }
    }

    fn try_login(&self, credentials: &SiteCredentials) -> Result<(), BrowserError> {
        self.browser.goto(&credentials.login_url())?;
        let name = self.browser.wait_for(By::Id("edit-name"), DEFAULT_WAIT)?;
        self.browser.send_keys(&name, &credentials.account)?;
        let pass = self.browser.find(By::Id("edit-pass"))?;
        self.browser.send_keys(&pass, &credentials.password)?;
        let submit = self.browser.find(By::Id("edit-submit"))?;
        self.browser.click(&submit)?;
        self.browser
            .wait_for_url(NAVIGATION_WAIT, "login redirect", |url| {
                url.contains("check_logged_in=1")
            })
            .map(drop)
    }

    fn try_upload(
        &self,
        base_identifier: &str,
        uuid: &str,
        pdf_path: &Path,
        txt_path: &Path,
    ) -> Result<(), StageError> {
        let pdf_path = absolute(pdf_path)?;
        let txt_path = absolute(txt_path)?;

        self.open_record(base_identifier, uuid)?;
        let media_url = self.open_media_tab().at("media_access")?;

        for (kind, path) in [
            (MediaKind::Document, &pdf_path),
            (MediaKind::ExtractedText, &txt_path),
        ] {
            if self.media_exists(&media_url, kind).at("media_check")? {
                info!(base_identifier, media = kind.label(), "media already attached; skipping");
                continue;
            }
            info!(base_identifier, media = kind.label(), path = %path.display(), "uploading media");
            self.upload_media(&media_url, kind, path)?;
        }

        let urls = self.collect_media_urls(&media_url)?;
        info!(base_identifier, pdf = %urls.pdf, txt = %urls.txt, "obtained media URLs");

        self.update_transcript_fields(&media_url, &urls)
            .at("metadata_update")?;
        info!(base_identifier, "metadata updated");
        Ok(())
    }

    /// Opens the item page and checks it carries the expected identifier,
    /// so a stale mapping cannot attach media to the wrong item.
    fn open_record(&self, base_identifier: &str, uuid: &str) -> Result<(), StageError> {
        const STAGE: &str = "direct_access";
        self.browser.goto(&self.credentials.item_url(uuid)).at(STAGE)?;
        let field = self
            .browser
            .wait_for(By::XPath(IDENTIFIER_FIELD_XPATH), NAVIGATION_WAIT)
            .at(STAGE)?;
        let shown = self.browser.text(&field).at(STAGE)?;

        let message = match self.matcher.extract(&shown) {
            Ok(found) if found == base_identifier => return Ok(()),
            Ok(found) => format!("item {uuid} shows {found}, expected {base_identifier}"),
            Err(err) => format!("item {uuid}: {err}"),
        };
        Err(StageError {
            stage: STAGE,
            message,
        })
    }

    fn open_media_tab(&self) -> Result<String, BrowserError> {
        let link = self
            .browser
            .wait_for_clickable(By::XPath(MEDIA_TAB_XPATH), DEFAULT_WAIT)?;
        self.browser.click(&link)?;
        self.browser
            .wait_for_url(DEFAULT_WAIT, "item media tab", |url| url.contains("/media"))
    }

    fn media_exists(&self, media_url: &str, kind: MediaKind) -> Result<bool, BrowserError> {
        self.browser.goto(media_url)?;
        let xpath = format!("//a[contains(@href, '/media/{}/')]", kind.path_segment());
        Ok(!self.browser.find_all(By::XPath(&xpath))?.is_empty())
    }

    fn upload_media(&self, media_url: &str, kind: MediaKind, path: &Path) -> Result<(), StageError> {
        let stage = kind.stage();
        let choice_xpath = format!(
            "//span[@class='label' and contains(text(), '{}')]",
            kind.label()
        );

        for resubmit in 0..=MAX_LOCK_RESUBMITS {
            self.browser.goto(&format!("{media_url}/add")).at(stage)?;
            self.browser
                .wait_for(By::XPath("//h1[contains(text(), 'Add media')]"), NAVIGATION_WAIT)
                .at(stage)?;

            let choice = self
                .browser
                .wait_for_clickable(By::XPath(&choice_xpath), DEFAULT_WAIT)
                .at(stage)?;
            self.browser.click(&choice).at(stage)?;

            let input = self
                .browser
                .wait_for(By::Css("input[type='file']"), DEFAULT_WAIT)
                .at(stage)?;
            self.browser
                .send_keys(&input, &path.display().to_string())
                .at(stage)?;

            let save = self.find_save_button().at(stage)?;
            self.browser.js_click(&save).at(stage)?;

            if self.file_lock_banner_visible().at(stage)? {
                warn!(media = kind.label(), resubmit, "file lock error detected; refreshing");
                self.browser.refresh().at(stage)?;
                continue;
            }

            self.browser
                .wait_for_url(DEFAULT_WAIT, "media save redirect", |url| {
                    url.contains("media") && !url.contains("/add")
                })
                .at(stage)?;
            return Ok(());
        }

        Err(StageError {
            stage,
            message: format!(
                "file stayed locked after {MAX_LOCK_RESUBMITS} resubmissions: {}",
                path.display()
            ),
        })
    }

    fn find_save_button(&self) -> Result<ElementRef, BrowserError> {
        self.browser.wait_until(DEFAULT_WAIT, "save button", |driver| {
            for xpath in SAVE_BUTTON_XPATHS {
                if let Some(button) = driver.find_all(By::XPath(xpath))?.into_iter().next() {
                    return Ok(Some(button));
                }
            }
            Ok(None)
        })
    }

    fn file_lock_banner_visible(&self) -> Result<bool, BrowserError> {
        match self.browser.wait_for(By::XPath(FILE_LOCK_XPATH), BANNER_WAIT) {
            Ok(_) => Ok(true),
            Err(BrowserError::Timeout { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn collect_media_urls(&self, media_url: &str) -> Result<MediaUrls, StageError> {
        const STAGE: &str = "get_file_urls";
        self.browser.goto(media_url).at(STAGE)?;
        let links = self
            .browser
            .wait_for_all(By::XPath(MEDIA_LINK_XPATH), DEFAULT_WAIT)
            .at(STAGE)?;

        let mut hrefs = Vec::with_capacity(links.len());
        for link in &links {
            if let Some(href) = self.browser.property(link, "href").at(STAGE)? {
                hrefs.push(href);
            }
        }

        media_urls_from_links(&hrefs).map_err(|message| StageError {
            stage: STAGE,
            message,
        })
    }

    fn update_transcript_fields(&self, media_url: &str, urls: &MediaUrls) -> Result<(), BrowserError> {
        let edit_url = edit_url_for(media_url);

        self.browser.goto(&edit_url)?;
        self.fill_link_field(0, &urls.pdf, "PDF Transcript")?;
        self.submit_edit_form()?;

        self.browser.goto(&edit_url)?;
        let second_uri = link_field_id(1, "uri");
        if self.browser.find_all(By::Id(&second_uri))?.is_empty() {
            self.add_link_field()?;
        }
        self.fill_link_field(1, &urls.txt, "TXT Transcript")?;
        self.submit_edit_form()?;

        self.browser
            .wait_for_url(DEFAULT_WAIT, "collection page after save", |url| {
                url.contains("/collections/")
            })
            .map(drop)
    }

    fn fill_link_field(&self, index: usize, url: &str, title: &str) -> Result<(), BrowserError> {
        let uri_id = link_field_id(index, "uri");
        let uri = self.browser.wait_for_clickable(By::Id(&uri_id), DEFAULT_WAIT)?;
        self.browser.clear(&uri)?;
        self.browser.send_keys(&uri, url)?;

        let title_id = link_field_id(index, "title");
        let title_field = self.browser.find(By::Id(&title_id))?;
        self.browser.clear(&title_field)?;
        self.browser.send_keys(&title_field, title)
    }

    fn add_link_field(&self) -> Result<(), BrowserError> {
        self.browser.wait_for(
            By::XPath("//table[contains(@id, 'field-transcript-file-s-values')]"),
            DEFAULT_WAIT,
        )?;
        let add = self.browser.wait_for_clickable(
            By::Css("input[name=\"field_transcript_file_s__add_more\"]"),
            DEFAULT_WAIT,
        )?;
        self.browser.scroll_into_view(&add)?;
        self.browser.click(&add)?;
        self.browser
            .wait_for(By::Id(&link_field_id(1, "uri")), DEFAULT_WAIT)
            .map(drop)
    }

    fn submit_edit_form(&self) -> Result<(), BrowserError> {
        let save = self
            .browser
            .wait_for_clickable(By::Css("input#edit-submit"), DEFAULT_WAIT)?;
        self.browser.click(&save)
    }
}

impl UploadDriver for LibraryUploader {
    fn login(&mut self, credentials: &SiteCredentials) -> Result<(), AuthError> {
        info!(account = %credentials.account, "navigating to login page");
        match self.try_login(credentials) {
            Ok(()) => {
                info!("login successful");
                Ok(())
            }
            Err(err) => {
                self.capture("login_failure");
                Err(AuthError {
                    reason: format!(
                        "{err}; check account and password in the config file"
                    ),
                })
            }
        }
    }

    fn upload(
        &mut self,
        base_identifier: &str,
        pdf_path: &Path,
        txt_path: &Path,
    ) -> Result<(), PipelineError> {
        let uuid = self.uuid_map.lookup(base_identifier)?.to_string();

        self.try_upload(base_identifier, &uuid, pdf_path, txt_path)
            .map_err(|err| {
                self.capture(err.stage);
                PipelineError::RemoteInteraction(err.to_string())
            })
    }
}

fn absolute(path: &Path) -> Result<PathBuf, StageError> {
    fs::canonicalize(path).map_err(|err| StageError {
        stage: "resolve_path",
        message: format!("{}: {err}", path.display()),
    })
}

fn link_field_id(index: usize, part: &str) -> String {
    format!("edit-field-transcript-file-s-{index}-{part}")
}

/// The item edit form sits beside its media tab.
pub fn edit_url_for(media_url: &str) -> String {
    match media_url.strip_suffix("/media") {
        Some(base) => format!("{base}/edit"),
        None => media_url.replace("/media", "/edit"),
    }
}

/// Picks the first document and extracted-text media links.
pub fn media_urls_from_links(hrefs: &[String]) -> Result<MediaUrls, String> {
    let find = |kind: MediaKind| {
        let needle = format!("/media/{}/", kind.path_segment());
        hrefs.iter().find(|href| href.contains(&needle)).cloned()
    };

    match (find(MediaKind::Document), find(MediaKind::ExtractedText)) {
        (Some(pdf), Some(txt)) => Ok(MediaUrls { pdf, txt }),
        (pdf, txt) => {
            let mut missing = Vec::new();
            if pdf.is_none() {
                missing.push("PDF");
            }
            if txt.is_none() {
                missing.push("TXT");
            }
            Err(format!("missing file URLs: {}", missing.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_url_replaces_media_tab_suffix() {
        assert_eq!(
            edit_url_for("https://lib.example.org/node/42/media"),
            "https://lib.example.org/node/42/edit"
        );
        assert_eq!(
            edit_url_for("https://lib.example.org/node/42/media?page=1"),
            "https://lib.example.org/node/42/edit?page=1"
        );
    }

    #[test]
    fn media_urls_pick_first_link_of_each_kind() {
        let hrefs = vec![
            "https://lib.example.org/admin/content/media".to_string(),
            "https://lib.example.org/media/document/17".to_string(),
            "https://lib.example.org/media/extracted-text/18".to_string(),
            "https://lib.example.org/media/document/99".to_string(),
        ];
        assert_eq!(
            media_urls_from_links(&hrefs),
            Ok(MediaUrls {
                pdf: "https://lib.example.org/media/document/17".to_string(),
                txt: "https://lib.example.org/media/extracted-text/18".to_string(),
            })
        );
    }

    #[test]
    fn media_urls_report_every_missing_kind() {
        assert_eq!(
            media_urls_from_links(&[]),
            Err("missing file URLs: PDF, TXT".to_string())
        );
        let only_pdf = vec!["https://lib.example.org/media/document/17".to_string()];
        assert_eq!(
            media_urls_from_links(&only_pdf),
            Err("missing file URLs: TXT".to_string())
        );
    }

    #[test]
    fn stage_errors_carry_stage_label() {
        let err: Result<(), StageError> = Err(BrowserError::Timeout {
            what: "xpath `//h1`".to_string(),
            timeout: Duration::from_secs(10),
        })
        .at("media_access");
        let err = err.expect_err("stage error");
        assert_eq!(err.stage, "media_access");
        assert_eq!(
            err.to_string(),
            "media_access: timed out after 10s waiting for xpath `//h1`"
        );
    }
}
