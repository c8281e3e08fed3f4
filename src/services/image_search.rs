// src/services/image_search.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::{db_utils::page_offset, error::AppError},
    config::ImageSearchConfig,
    db::{CatalogStore, MainImagePolicy},
    models::{
        catalog::{display_image, Image, ImageKind, ImageView, NewImage, ProductSummary},
        image_search::{
            BulkItemError, BulkReport, BulkRequest, BulkSettingsForm, Candidate, FileType,
            ImageColorType, ImageCommitError, ImageSize, ImageType, ProductCommit,
            ProductSelection, SafeSearch, SearchFilters, SearchPage, SearchRequest, SearchState,
            SelectionAction, SelectionForm, SelectionOutcome, WorklistFilter, WorklistPage,
            WorklistQuery, WorklistScope,
        },
    },
    services::{
        image_provider::{ImageFetcher, ImageProvider, MAX_RESULTS_PER_QUERY},
        media::{decode_data_url, extension_hint, MediaStorage},
    },
};

pub const WORKLIST_PER_PAGE: u32 = 25;
const WEBCAM_PROVIDER: &str = "webcam";

#[derive(Clone)]
pub struct ImageSearchService {
    store: Arc<dyn CatalogStore>,
    provider: Arc<dyn ImageProvider>,
    fetcher: Arc<dyn ImageFetcher>,
    media: MediaStorage,
    config: ImageSearchConfig,
}

impl ImageSearchService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        provider: Arc<dyn ImageProvider>,
        fetcher: Arc<dyn ImageFetcher>,
        media: MediaStorage,
        config: ImageSearchConfig,
    ) -> Self {
        Self { store, provider, fetcher, media, config }
    }

    // ---
    // Worklist e página de busca
    // ---

    pub async fn worklist(&self, query: WorklistQuery) -> Result<WorklistPage, AppError> {
        let (page, offset) = page_offset(query.page, WORKLIST_PER_PAGE);
        let filter = WorklistFilter {
            category_slug: non_empty(query.category),
            below: query.below,
            search: non_empty(query.q),
            limit: Some(i64::from(WORKLIST_PER_PAGE)),
            offset,
        };
        let products = self.store.list_worklist(&filter).await?;
        Ok(WorklistPage {
            page,
            per_page: WORKLIST_PER_PAGE,
            products,
        })
    }

    /// Estado inicial (Idle): produto, query padrão, próximo da fila e imagens atuais.
    /// O próximo produto respeita os filtros da worklist em `scope`.
    pub async fn search_page(
        &self,
        product_id: Uuid,
        scope: WorklistScope,
        saved: Option<u32>,
        failed: Option<u32>,
    ) -> Result<SearchPage, AppError> {
        let product = self.require_product(product_id).await?;
        let images = self.store.product_images(product_id).await?;

        let mut messages = Vec::new();
        if let Some(saved) = saved {
            messages.push(format!("{} imagem(ns) salva(s).", saved));
        }
        if let Some(failed) = failed.filter(|f| *f > 0) {
            messages.push(format!("{} imagem(ns) falharam.", failed));
        }

        self.build_page(product, images, scope, SearchState::Idle, messages).await
    }

    /// Estado `Searched`: falha do provedor vira mensagem, nunca aborta a requisição.
    pub async fn search(&self, product_id: Uuid, request: SearchRequest) -> Result<SearchPage, AppError> {
        let num_results = request.num_results.unwrap_or(MAX_RESULTS_PER_QUERY);
        validate_num_results(num_results)?;

        let product = self.require_product(product_id).await?;
        let images = self.store.product_images(product_id).await?;
        let query = non_empty(request.query).unwrap_or_else(|| self.render_query(&product));

        let state = match self.provider.search(&query, num_results, &request.filters).await {
            Ok(urls) => SearchState::Searched {
                candidates: urls
                    .into_iter()
                    .map(|url| Candidate {
                        already_attached: images
                            .iter()
                            .any(|img| img.source_url.as_deref() == Some(url.as_str())),
                        url,
                    })
                    .collect(),
                query,
                provider_error: None,
            },
            Err(e) => {
                tracing::warn!(%product_id, "busca de imagens falhou: {}", e);
                SearchState::Searched {
                    query,
                    candidates: Vec::new(),
                    provider_error: Some(e.to_string()),
                }
            }
        };

        self.build_page(product, images, request.scope, state, Vec::new()).await
    }

    /// Substitui {name}, {article} e {category}; espaços repetidos são colapsados.
    pub fn render_query(&self, product: &ProductSummary) -> String {
        let rendered = self
            .config
            .query_template
            .replace("{name}", &product.name)
            .replace("{article}", product.article_number.as_deref().unwrap_or(""))
            .replace("{category}", product.category_name.as_deref().unwrap_or(""));
        let collapsed = rendered.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            product.name.clone()
        } else {
            collapsed
        }
    }

    async fn build_page(
        &self,
        product: ProductSummary,
        images: Vec<Image>,
        scope: WorklistScope,
        state: SearchState,
        messages: Vec<String>,
    ) -> Result<SearchPage, AppError> {
        let next_product_id = self
            .store
            .next_in_worklist(&product, &scope.filter())
            .await?;

        Ok(SearchPage {
            default_query: self.render_query(&product),
            attached_images: self.image_views(product.main_image_id, &images),
            next_product_id,
            product,
            scope,
            state,
            messages,
        })
    }

    fn image_views(&self, main_image_id: Option<Uuid>, images: &[Image]) -> Vec<ImageView> {
        let shown = display_image(main_image_id, images).map(|img| img.id);
        images
            .iter()
            .map(|img| ImageView {
                id: img.id,
                url: self.media.url_for(&img.file_path),
                alt_text: img.alt_text.clone(),
                is_main: shown == Some(img.id),
                source_url: img.source_url.clone(),
            })
            .collect()
    }

    // ---
    // Commit da seleção
    // ---

    pub async fn commit_selection(&self, form: SelectionForm) -> Result<SelectionOutcome, AppError> {
        let mut outcome = SelectionOutcome {
            action: form.action,
            products: Vec::new(),
            images_added: 0,
            errors: Vec::new(),
            messages: Vec::new(),
            next_product_id: form.next_product_id,
        };

        if form.action == SelectionAction::Skip {
            return Ok(outcome);
        }

        // Todos os produtos precisam existir antes de qualquer escrita.
        let mut targets = Vec::with_capacity(form.selections.len());
        for selection in form.selections {
            let product = self.require_product(selection.product_id).await?;
            targets.push((product, selection));
        }

        for (product, selection) in targets {
            let commit = self.commit_product(&product, &selection, &mut outcome.errors).await?;
            outcome.images_added += commit.images_added;
            if commit.images_added > 0 {
                outcome.messages.push(format!(
                    "{} imagem(ns) salva(s) para {}.",
                    commit.images_added, product.name
                ));
            }
            outcome.products.push(commit);
        }

        for error in &outcome.errors {
            outcome
                .messages
                .push(format!("Falha ao salvar {}: {}", error.url, error.error));
        }
        if outcome.products.is_empty() {
            outcome.messages.push("Nenhuma imagem selecionada.".to_string());
        }

        Ok(outcome)
    }

    async fn commit_product(
        &self,
        product: &ProductSummary,
        selection: &ProductSelection,
        errors: &mut Vec<ImageCommitError>,
    ) -> Result<ProductCommit, AppError> {
        let existing = self.store.product_images(product.id).await?;
        let query = self.render_query(product);

        // A principal escolhida entra mesmo sem o checkbox marcado.
        let mut urls: Vec<&str> = Vec::new();
        for url in selection.urls.iter().chain(selection.main_url.iter()) {
            if !urls.contains(&url.as_str()) {
                urls.push(url);
            }
        }

        let mut commit = ProductCommit {
            product_id: product.id,
            product_name: product.name.clone(),
            images_added: 0,
            main_image_id: product.main_image_id,
        };

        for url in urls {
            let is_main = selection.main_url.as_deref() == Some(url);

            if let Some(attached) = existing.iter().find(|img| img.source_url.as_deref() == Some(url)) {
                if is_main {
                    self.store.set_main_image(product.id, attached.id).await?;
                    commit.main_image_id = Some(attached.id);
                }
                continue;
            }

            let policy = if is_main { MainImagePolicy::Set } else { MainImagePolicy::Keep };
            let position = existing.len() + commit.images_added as usize + 1;

            match self.fetch_and_attach(product, url, &query, position, policy).await {
                Ok(image) => {
                    commit.images_added += 1;
                    if is_main {
                        commit.main_image_id = Some(image.id);
                    }
                }
                Err(e) => {
                    tracing::warn!(product_id = %product.id, url, "falha ao anexar imagem: {}", e);
                    errors.push(ImageCommitError {
                        product_id: product.id,
                        url: url.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(commit)
    }

    /// Baixa, grava e anexa. Se o banco falhar, o arquivo gravado é removido.
    async fn fetch_and_attach(
        &self,
        product: &ProductSummary,
        url: &str,
        query: &str,
        position: usize,
        policy: MainImagePolicy,
    ) -> Result<Image, AppError> {
        let fetched = self.fetcher.fetch(url).await?;
        let hint = extension_hint(url, fetched.content_type.as_deref());
        let stored = self
            .media
            .store_image_bytes(fetched.bytes, &format!("{}_{}", product.slug, position), hint.as_deref())
            .await?;

        let new_image = NewImage {
            name: Some(product.name.clone()),
            file_path: stored.file_path.clone(),
            alt_text: Some(product.name.clone()),
            description: None,
            kind: ImageKind::Product,
            resolution: Some(stored.resolution),
            size_kb: Some(stored.size_kb),
            format: Some(stored.format),
            source_provider: Some(self.provider.name().to_string()),
            source_query: Some(query.to_string()),
            source_url: Some(url.to_string()),
        };

        match self.store.attach_new_image(product.id, new_image, policy).await {
            Ok(image) => Ok(image),
            Err(e) => {
                self.media.remove(&stored.file_path).await;
                Err(e)
            }
        }
    }

    // ---
    // Webcam
    // ---

    /// Grava a captura e anexa na hora (principal não muda). Retorna a URL pública.
    pub async fn upload_webcam(&self, product_id: Uuid, image_data: &str) -> Result<String, AppError> {
        let product = self.require_product(product_id).await?;
        let (bytes, subtype) = decode_data_url(image_data)?;

        let position = usize::try_from(product.image_count).unwrap_or(0) + 1;
        let stored = self
            .media
            .store_image_bytes(bytes, &format!("{}_{}", product.slug, position), Some(&subtype))
            .await?;

        let new_image = NewImage {
            name: Some(format!("{} (webcam)", product.name)),
            file_path: stored.file_path.clone(),
            alt_text: Some(product.name.clone()),
            description: None,
            kind: ImageKind::Product,
            resolution: Some(stored.resolution),
            size_kb: Some(stored.size_kb),
            format: Some(stored.format),
            source_provider: Some(WEBCAM_PROVIDER.to_string()),
            source_query: None,
            source_url: None,
        };

        match self
            .store
            .attach_new_image(product.id, new_image, MainImagePolicy::Keep)
            .await
        {
            Ok(image) => {
                tracing::info!(%product_id, image_id = %image.id, "imagem da webcam anexada");
                Ok(self.media.url_for(&image.file_path))
            }
            Err(e) => {
                self.media.remove(&stored.file_path).await;
                Err(e)
            }
        }
    }

    // ---
    // Busca em lote
    // ---

    pub fn bulk_settings(&self) -> BulkSettingsForm {
        BulkSettingsForm {
            num_results: self.config.target_count.clamp(1, MAX_RESULTS_PER_QUERY),
            num_results_min: 1,
            num_results_max: MAX_RESULTS_PER_QUERY,
            defaults: SearchFilters::default(),
            img_size_options: ImageSize::ALL.to_vec(),
            img_type_options: ImageType::ALL.to_vec(),
            img_color_type_options: ImageColorType::ALL.to_vec(),
            file_type_options: FileType::ALL.to_vec(),
            safe_search_options: SafeSearch::ALL.to_vec(),
        }
    }

    /// Completa cada produto ativo até `num_results` imagens.
    /// Produtos já completos são pulados sem chamar o provedor; falhas por item não abortam o lote.
    pub async fn run_bulk(&self, request: BulkRequest) -> Result<BulkReport, AppError> {
        let target = request.num_results.unwrap_or(self.config.target_count);
        validate_num_results(target)?;

        let filter = WorklistFilter {
            category_slug: non_empty(request.category),
            ..WorklistFilter::default()
        };
        let products = self.store.list_worklist(&filter).await?;

        let mut report = BulkReport::default();
        for product in &products {
            let current = u32::try_from(product.image_count).unwrap_or(u32::MAX);
            if current >= target {
                report.products_skipped_count += 1;
                continue;
            }

            let needed = target - current;
            let query = self.render_query(product);

            let urls = match self.provider.search(&query, needed, &request.filters).await {
                Ok(urls) => urls,
                Err(e) => {
                    tracing::warn!(product_id = %product.id, "lote: provedor falhou: {}", e);
                    report.products_failed_count += 1;
                    report.errors.push(BulkItemError {
                        product_id: product.id,
                        product_name: product.name.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            report.products_processed_count += 1;

            for (i, url) in urls.iter().take(needed as usize).enumerate() {
                let position = current as usize + i + 1;
                match self
                    .fetch_and_attach(product, url, &query, position, MainImagePolicy::SetIfEmpty)
                    .await
                {
                    Ok(_) => report.total_images_added += 1,
                    Err(e) => {
                        tracing::warn!(product_id = %product.id, url = %url, "lote: falha ao anexar: {}", e);
                        report.errors.push(BulkItemError {
                            product_id: product.id,
                            product_name: product.name.clone(),
                            error: format!("{}: {}", url, e),
                        });
                    }
                }
            }
        }

        tracing::info!(
            processed = report.products_processed_count,
            skipped = report.products_skipped_count,
            failed = report.products_failed_count,
            added = report.total_images_added,
            "busca em lote concluída"
        );
        Ok(report)
    }

    async fn require_product(&self, product_id: Uuid) -> Result<ProductSummary, AppError> {
        self.store
            .find_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Produto não encontrado.".into()))
    }
}

fn validate_num_results(value: u32) -> Result<(), AppError> {
    if (1..=MAX_RESULTS_PER_QUERY).contains(&value) {
        Ok(())
    } else {
        Err(AppError::field(
            "num_results",
            "range",
            format!("Informe um valor entre 1 e {}.", MAX_RESULTS_PER_QUERY),
        ))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---
// Formulário de seleção (chaves repetidas)
// ---

/// Lê `selected_images=<product_id>,<url>`, `is_main_<product_id>=<url>`,
/// `next_product_id`, `skip_product`, `action` e os filtros da worklist
/// (`category`, `below`, `q`).
pub fn parse_selection_form(pairs: &[(String, String)]) -> Result<SelectionForm, AppError> {
    let mut selections: Vec<ProductSelection> = Vec::new();
    let mut next_product_id = None;
    let mut skip = false;
    let mut explicit_action = None;
    let mut scope = WorklistScope::default();

    fn entry(selections: &mut Vec<ProductSelection>, product_id: Uuid) -> &mut ProductSelection {
        match selections.iter().position(|s| s.product_id == product_id) {
            Some(idx) => &mut selections[idx],
            None => {
                selections.push(ProductSelection {
                    product_id,
                    urls: Vec::new(),
                    main_url: None,
                });
                let last = selections.len() - 1;
                &mut selections[last]
            }
        }
    }

    for (key, value) in pairs {
        let value = value.trim();
        match key.as_str() {
            "selected_images" => {
                let (raw_id, url) = value.split_once(',').ok_or_else(|| {
                    AppError::field("selected_images", "format", "Esperado '<produto>,<url>'.")
                })?;
                let product_id = parse_uuid("selected_images", raw_id)?;
                let url = url.trim();
                if url.is_empty() {
                    return Err(AppError::field("selected_images", "format", "URL vazia."));
                }
                let selection = entry(&mut selections, product_id);
                if !selection.urls.iter().any(|u| u == url) {
                    selection.urls.push(url.to_string());
                }
            }
            "next_product_id" => {
                if !value.is_empty() {
                    next_product_id = Some(parse_uuid("next_product_id", value)?);
                }
            }
            "category" => scope.category = Some(value.to_string()),
            "q" => scope.q = Some(value.to_string()),
            "below" => {
                if !value.is_empty() {
                    let below = value.parse::<i64>().map_err(|_| {
                        AppError::field("below", "integer", "Informe um número inteiro.")
                    })?;
                    scope.below = Some(below);
                }
            }
            "skip_product" => {
                skip = matches!(value.to_ascii_lowercase().as_str(), "true" | "on" | "1");
            }
            "action" => {
                explicit_action = Some(match value {
                    "save" => SelectionAction::Save,
                    "save_next" => SelectionAction::SaveAndNext,
                    "skip" => SelectionAction::Skip,
                    _ => {
                        return Err(AppError::field(
                            "action",
                            "invalid",
                            "Ação deve ser save, save_next ou skip.",
                        ));
                    }
                });
            }
            other => {
                if let Some(raw_id) = other.strip_prefix("is_main_") {
                    let product_id = parse_uuid("is_main", raw_id)?;
                    if !value.is_empty() {
                        entry(&mut selections, product_id).main_url = Some(value.to_string());
                    }
                }
                // Demais campos do formulário (csrf, botões) são ignorados.
            }
        }
    }

    let action = explicit_action.unwrap_or(if skip {
        SelectionAction::Skip
    } else if next_product_id.is_some() {
        SelectionAction::SaveAndNext
    } else {
        SelectionAction::Save
    });

    Ok(SelectionForm {
        selections,
        next_product_id,
        action,
        scope,
    })
}

fn parse_uuid(field: &'static str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::field(field, "uuid", format!("'{}' não é um id válido.", raw.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        image_provider::{FetchedImage, MockImageProvider, ProviderError},
        media::tests::png_bytes,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::{collections::HashMap, sync::Mutex, time::Duration};

    // ---
    // Fakes
    // ---

    #[derive(Default)]
    struct FakeState {
        products: Vec<ProductSummary>,
        images: HashMap<Uuid, Vec<Image>>,
        fail_attach: bool,
    }

    #[derive(Default)]
    struct FakeStore {
        state: Mutex<FakeState>,
    }

    impl FakeStore {
        fn with_products(products: Vec<ProductSummary>) -> Self {
            Self {
                state: Mutex::new(FakeState {
                    products,
                    ..FakeState::default()
                }),
            }
        }

        fn product(&self, id: Uuid) -> ProductSummary {
            let state = self.state.lock().unwrap();
            state.products.iter().find(|p| p.id == id).cloned().unwrap()
        }

        fn images(&self, id: Uuid) -> Vec<Image> {
            self.state.lock().unwrap().images.get(&id).cloned().unwrap_or_default()
        }

        fn total_images(&self) -> usize {
            self.state.lock().unwrap().images.values().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl CatalogStore for FakeStore {
        async fn find_product(&self, product_id: Uuid) -> Result<Option<ProductSummary>, AppError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .products
                .iter()
                .find(|p| p.id == product_id)
                .cloned())
        }

        async fn list_worklist(&self, filter: &WorklistFilter) -> Result<Vec<ProductSummary>, AppError> {
            let mut products = self.state.lock().unwrap().products.clone();
            products.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
            Ok(products
                .into_iter()
                .filter(|p| filter.below.is_none_or(|below| p.image_count < below))
                .skip(filter.offset as usize)
                .take(filter.limit.map_or(usize::MAX, |l| l as usize))
                .collect())
        }

        async fn next_in_worklist(
            &self,
            current: &ProductSummary,
            filter: &WorklistFilter,
        ) -> Result<Option<Uuid>, AppError> {
            Ok(self
                .list_worklist(filter)
                .await?
                .into_iter()
                .find(|p| (&p.name, p.id) > (&current.name, current.id))
                .map(|p| p.id))
        }

        async fn product_images(&self, product_id: Uuid) -> Result<Vec<Image>, AppError> {
            Ok(self.images(product_id))
        }

        async fn attach_new_image(
            &self,
            product_id: Uuid,
            image: NewImage,
            policy: MainImagePolicy,
        ) -> Result<Image, AppError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_attach {
                return Err(AppError::InternalServerError(anyhow::anyhow!("banco fora do ar")));
            }
            let now = Utc::now();
            let stored = Image {
                id: Uuid::new_v4(),
                name: image.name,
                file_path: image.file_path,
                alt_text: image.alt_text,
                description: image.description,
                kind: image.kind,
                resolution: image.resolution,
                size_kb: image.size_kb,
                format: image.format,
                source_provider: image.source_provider,
                source_query: image.source_query,
                source_url: image.source_url,
                created_at: now,
                updated_at: now,
            };
            state.images.entry(product_id).or_default().push(stored.clone());
            let product = state
                .products
                .iter_mut()
                .find(|p| p.id == product_id)
                .ok_or_else(|| AppError::NotFound("produto".into()))?;
            product.image_count += 1;
            match policy {
                MainImagePolicy::Keep => {}
                MainImagePolicy::Set => product.main_image_id = Some(stored.id),
                MainImagePolicy::SetIfEmpty => {
                    product.main_image_id.get_or_insert(stored.id);
                }
            }
            Ok(stored)
        }

        async fn set_main_image(&self, product_id: Uuid, image_id: Uuid) -> Result<(), AppError> {
            let mut state = self.state.lock().unwrap();
            if let Some(product) = state.products.iter_mut().find(|p| p.id == product_id) {
                product.main_image_id = Some(image_id);
            }
            Ok(())
        }
    }

    /// Responde PNG válido; URLs contendo "broken" falham.
    struct FakeFetcher;

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, AppError> {
            if url.contains("broken") {
                return Err(AppError::ImageStoreFailure(format!("falha ao baixar {}: 404", url)));
            }
            Ok(FetchedImage {
                bytes: png_bytes(2, 2),
                content_type: Some("image/png".into()),
            })
        }
    }

    fn summary(id: u128, name: &str, image_count: i64) -> ProductSummary {
        ProductSummary {
            id: Uuid::from_u128(id),
            name: name.to_string(),
            slug: crate::common::db_utils::slugify(name),
            article_number: Some(format!("ART-{id}")),
            category_name: Some("Ferramentas".into()),
            main_image_id: None,
            image_count,
        }
    }

    fn config(target: u32) -> ImageSearchConfig {
        ImageSearchConfig {
            api_key: None,
            cse_id: None,
            endpoint: String::new(),
            target_count: target,
            provider_timeout: Duration::from_secs(1),
            download_timeout: Duration::from_secs(1),
            query_template: "{name} {category}".into(),
        }
    }

    fn service(
        store: Arc<FakeStore>,
        provider: MockImageProvider,
        media_root: &std::path::Path,
        target: u32,
    ) -> ImageSearchService {
        ImageSearchService::new(
            store,
            Arc::new(provider),
            Arc::new(FakeFetcher),
            MediaStorage::new(media_root.to_path_buf(), "/media".into()),
            config(target),
        )
    }

    fn urls(n: usize, prefix: &str) -> Vec<String> {
        (1..=n).map(|i| format!("https://img.example/{prefix}{i}.png")).collect()
    }

    fn google() -> MockImageProvider {
        let mut provider = MockImageProvider::new();
        provider.expect_name().return_const("google");
        provider
    }

    // ---
    // Lote
    // ---

    #[tokio::test]
    async fn bulk_fills_widget_up_to_target_and_sets_first_as_main() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Widget-42", 0)]));

        let mut provider = google();
        provider
            .expect_search()
            .withf(|query, max, _| query == "Widget-42 Ferramentas" && *max == 3)
            .times(1)
            .returning(|_, _, _| Ok(urls(5, "w")));

        let svc = service(store.clone(), provider, dir.path(), 3);
        let report = svc
            .run_bulk(BulkRequest { num_results: None, category: None, filters: SearchFilters::default() })
            .await
            .unwrap();

        assert_eq!(report.products_processed_count, 1);
        assert_eq!(report.total_images_added, 3);
        assert!(report.errors.is_empty());

        let images = store.images(Uuid::from_u128(1));
        assert_eq!(images.len(), 3);
        let sources: Vec<_> = images.iter().map(|i| i.source_url.clone().unwrap()).collect();
        assert_eq!(sources, urls(3, "w"));
        assert_eq!(store.product(Uuid::from_u128(1)).main_image_id, Some(images[0].id));
        assert_eq!(images[0].source_provider.as_deref(), Some("google"));
    }

    #[tokio::test]
    async fn bulk_never_calls_provider_for_satisfied_products_and_rerun_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![
            summary(1, "Alfa", 3),
            summary(2, "Beta", 1),
        ]));

        let mut provider = google();
        provider
            .expect_search()
            .withf(|query, max, _| query.starts_with("Beta") && *max == 2)
            .times(1)
            .returning(|_, _, _| Ok(urls(4, "b")));
        provider
            .expect_search()
            .withf(|query, _, _| query.starts_with("Alfa"))
            .times(0);

        let svc = service(store.clone(), provider, dir.path(), 3);
        let request = BulkRequest { num_results: Some(3), category: None, filters: SearchFilters::default() };

        let first = svc.run_bulk(request.clone()).await.unwrap();
        assert_eq!(first.products_skipped_count, 1);
        assert_eq!(first.products_processed_count, 1);
        assert_eq!(first.total_images_added, 2);

        let second = svc.run_bulk(request).await.unwrap();
        assert_eq!(second.total_images_added, 0);
        assert_eq!(second.products_skipped_count, 2);
    }

    #[tokio::test]
    async fn bulk_provider_failure_is_recorded_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let products: Vec<_> = (1..=10).map(|i| summary(i, &format!("Produto {:02}", i), 0)).collect();
        let store = Arc::new(FakeStore::with_products(products));

        let mut provider = google();
        provider
            .expect_search()
            .times(10)
            .returning(|query, _, _| {
                if query.starts_with("Produto 07") {
                    Err(ProviderError::QuotaExceeded)
                } else {
                    Ok(urls(1, "p"))
                }
            });

        let svc = service(store.clone(), provider, dir.path(), 1);
        let report = svc
            .run_bulk(BulkRequest { num_results: None, category: None, filters: SearchFilters::default() })
            .await
            .unwrap();

        assert_eq!(report.products_processed_count, 9);
        assert_eq!(report.products_failed_count, 1);
        assert_eq!(report.total_images_added, 9);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].product_id, Uuid::from_u128(7));
        assert!(store.images(Uuid::from_u128(7)).is_empty());
    }

    #[tokio::test]
    async fn bulk_download_failures_are_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Widget", 0)]));

        let mut provider = google();
        provider.expect_search().times(1).returning(|_, _, _| {
            Ok(vec![
                "https://img.example/broken.png".to_string(),
                "https://img.example/ok.png".to_string(),
            ])
        });

        let svc = service(store.clone(), provider, dir.path(), 2);
        let report = svc
            .run_bulk(BulkRequest { num_results: None, category: None, filters: SearchFilters::default() })
            .await
            .unwrap();

        assert_eq!(report.products_processed_count, 1);
        assert_eq!(report.total_images_added, 1);
        assert_eq!(report.errors.len(), 1);
        // A primeira imagem que deu certo vira a principal.
        let images = store.images(Uuid::from_u128(1));
        assert_eq!(store.product(Uuid::from_u128(1)).main_image_id, Some(images[0].id));
    }

    #[tokio::test]
    async fn bulk_keeps_existing_main_image() {
        let dir = tempfile::tempdir().unwrap();
        let current_main = Uuid::from_u128(77);
        let mut product = summary(1, "Widget", 1);
        product.main_image_id = Some(current_main);
        let store = Arc::new(FakeStore::with_products(vec![product]));

        let mut provider = google();
        provider
            .expect_search()
            .withf(|_, max, _| *max == 2)
            .times(1)
            .returning(|_, _, _| Ok(urls(2, "w")));

        let svc = service(store.clone(), provider, dir.path(), 3);
        let report = svc
            .run_bulk(BulkRequest { num_results: None, category: None, filters: SearchFilters::default() })
            .await
            .unwrap();

        assert_eq!(report.total_images_added, 2);
        assert_eq!(store.product(Uuid::from_u128(1)).main_image_id, Some(current_main));
    }

    #[tokio::test]
    async fn bulk_rejects_out_of_range_target() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(Arc::new(FakeStore::default()), google(), dir.path(), 3);
        let err = svc
            .run_bulk(BulkRequest { num_results: Some(11), category: None, filters: SearchFilters::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    // ---
    // Um a um
    // ---

    #[tokio::test]
    async fn search_marks_already_attached_and_reports_provider_error_inline() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![
            summary(1, "Alfa", 0),
            summary(2, "Beta", 0),
        ]));

        let mut provider = google();
        provider
            .expect_search()
            .withf(|query, max, _| query == "martelo" && *max == 2)
            .times(1)
            .returning(|_, _, _| Ok(urls(2, "a")));
        provider
            .expect_search()
            .withf(|query, _, _| query == "Alfa Ferramentas")
            .times(1)
            .returning(|_, _, _| Err(ProviderError::Unavailable("timeout".into())));

        let svc = service(store.clone(), provider, dir.path(), 3);
        let id = Uuid::from_u128(1);

        let form = parse_selection_form(&[(
            "selected_images".into(),
            format!("{},https://img.example/a1.png", id),
        )])
        .unwrap();
        svc.commit_selection(form).await.unwrap();

        let page = svc
            .search(id, SearchRequest {
                query: Some(" martelo ".into()),
                num_results: Some(2),
                filters: SearchFilters::default(),
                scope: WorklistScope::default(),
            })
            .await
            .unwrap();
        assert_eq!(page.next_product_id, Some(Uuid::from_u128(2)));
        match page.state {
            SearchState::Searched { candidates, provider_error, .. } => {
                assert!(provider_error.is_none());
                assert!(candidates[0].already_attached);
                assert!(!candidates[1].already_attached);
            }
            other => panic!("estado inesperado: {other:?}"),
        }

        let page = svc
            .search(id, SearchRequest {
                query: None,
                num_results: None,
                filters: SearchFilters::default(),
                scope: WorklistScope::default(),
            })
            .await
            .unwrap();
        match page.state {
            SearchState::Searched { candidates, provider_error, .. } => {
                assert!(candidates.is_empty());
                assert!(provider_error.is_some());
            }
            other => panic!("estado inesperado: {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_page_has_flash_and_last_product_has_no_next() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![
            summary(1, "Alfa", 0),
            summary(2, "Beta", 0),
        ]));
        let svc = service(store, google(), dir.path(), 3);

        let page = svc.search_page(Uuid::from_u128(2), WorklistScope::default(), Some(2), Some(1)).await.unwrap();
        assert_eq!(page.state, SearchState::Idle);
        assert_eq!(page.next_product_id, None);
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.default_query, "Beta Ferramentas");

        let err = svc.search_page(Uuid::from_u128(9), WorklistScope::default(), None, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn next_product_follows_the_filtered_worklist() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![
            summary(1, "Alfa", 0),
            summary(2, "Beta", 5),
            summary(3, "Gama", 0),
        ]));

        let mut provider = google();
        provider.expect_search().times(1).returning(|_, _, _| Ok(Vec::new()));
        let svc = service(store, provider, dir.path(), 3);
        let alfa = Uuid::from_u128(1);
        let only_empty = WorklistScope { below: Some(1), ..WorklistScope::default() };

        let listed: Vec<_> = svc
            .worklist(WorklistQuery { below: Some(1), ..WorklistQuery::default() })
            .await
            .unwrap()
            .products
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(listed, vec!["Alfa", "Gama"]);

        let page = svc.search_page(alfa, only_empty.clone(), None, None).await.unwrap();
        assert_eq!(page.next_product_id, Some(Uuid::from_u128(3)));
        assert_eq!(page.scope, only_empty);

        let page = svc
            .search(
                alfa,
                SearchRequest {
                    query: None,
                    num_results: None,
                    filters: SearchFilters::default(),
                    scope: only_empty.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(page.next_product_id, Some(Uuid::from_u128(3)));

        // Sem filtros, o próximo é simplesmente o seguinte em (name, id).
        let page = svc.search_page(alfa, WorklistScope::default(), None, None).await.unwrap();
        assert_eq!(page.next_product_id, Some(Uuid::from_u128(2)));
    }

    #[tokio::test]
    async fn commit_without_radio_keeps_main_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        let svc = service(store.clone(), google(), dir.path(), 3);
        let id = Uuid::from_u128(1);

        let form = parse_selection_form(&[
            ("selected_images".into(), format!("{},https://img.example/1.png", id)),
            ("selected_images".into(), format!("{},https://img.example/2.png", id)),
        ])
        .unwrap();
        let outcome = svc.commit_selection(form).await.unwrap();

        assert_eq!(outcome.action, SelectionAction::Save);
        assert_eq!(outcome.images_added, 2);
        assert_eq!(store.product(id).main_image_id, None);
    }

    #[tokio::test]
    async fn commit_without_radio_keeps_existing_main_image() {
        let dir = tempfile::tempdir().unwrap();
        let current_main = Uuid::from_u128(77);
        let mut product = summary(1, "Alfa", 1);
        product.main_image_id = Some(current_main);
        let store = Arc::new(FakeStore::with_products(vec![product]));
        let svc = service(store.clone(), google(), dir.path(), 3);
        let id = Uuid::from_u128(1);

        let form = parse_selection_form(&[
            ("selected_images".into(), format!("{},https://img.example/1.png", id)),
            ("selected_images".into(), format!("{},https://img.example/2.png", id)),
        ])
        .unwrap();
        let outcome = svc.commit_selection(form).await.unwrap();

        assert_eq!(outcome.images_added, 2);
        assert_eq!(outcome.products[0].main_image_id, Some(current_main));
        assert_eq!(store.product(id).main_image_id, Some(current_main));
    }

    #[tokio::test]
    async fn commit_with_radio_sets_main_even_if_not_ticked() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        let svc = service(store.clone(), google(), dir.path(), 3);
        let id = Uuid::from_u128(1);

        let form = parse_selection_form(&[
            ("selected_images".into(), format!("{},https://img.example/1.png", id)),
            (format!("is_main_{}", id), "https://img.example/2.png".into()),
        ])
        .unwrap();
        let outcome = svc.commit_selection(form).await.unwrap();

        assert_eq!(outcome.images_added, 2);
        let images = store.images(id);
        let main = images
            .iter()
            .find(|i| i.source_url.as_deref() == Some("https://img.example/2.png"))
            .unwrap();
        assert_eq!(store.product(id).main_image_id, Some(main.id));
        assert_eq!(outcome.products[0].main_image_id, Some(main.id));
    }

    #[tokio::test]
    async fn commit_continues_after_failed_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        let svc = service(store.clone(), google(), dir.path(), 3);
        let id = Uuid::from_u128(1);

        let form = parse_selection_form(&[
            ("selected_images".into(), format!("{},https://img.example/broken.png", id)),
            ("selected_images".into(), format!("{},https://img.example/ok.png", id)),
        ])
        .unwrap();
        let outcome = svc.commit_selection(form).await.unwrap();

        assert_eq!(outcome.images_added, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].url, "https://img.example/broken.png");
        assert!(outcome.messages.iter().any(|m| m.contains("broken.png")));
    }

    #[tokio::test]
    async fn commit_for_unknown_product_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        let svc = service(store.clone(), google(), dir.path(), 3);

        let form = parse_selection_form(&[
            ("selected_images".into(), format!("{},https://img.example/1.png", Uuid::from_u128(1))),
            ("selected_images".into(), format!("{},https://img.example/2.png", Uuid::from_u128(5))),
        ])
        .unwrap();
        let err = svc.commit_selection(form).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.total_images(), 0);
    }

    #[tokio::test]
    async fn skip_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        let svc = service(store.clone(), google(), dir.path(), 3);

        let form = parse_selection_form(&[
            ("selected_images".into(), format!("{},https://img.example/1.png", Uuid::from_u128(1))),
            ("next_product_id".into(), Uuid::from_u128(2).to_string()),
            ("skip_product".into(), "true".into()),
        ])
        .unwrap();
        let outcome = svc.commit_selection(form).await.unwrap();

        assert_eq!(outcome.action, SelectionAction::Skip);
        assert_eq!(outcome.next_product_id, Some(Uuid::from_u128(2)));
        assert_eq!(store.total_images(), 0);
    }

    // ---
    // Webcam
    // ---

    #[tokio::test]
    async fn webcam_capture_is_attached_without_touching_main() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        let svc = service(store.clone(), MockImageProvider::new(), dir.path(), 3);
        let id = Uuid::from_u128(1);

        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(3, 3)));
        let url = svc.upload_webcam(id, &data_url).await.unwrap();

        assert!(url.starts_with("/media/images/alfa_1_"));
        let images = store.images(id);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].source_provider.as_deref(), Some("webcam"));
        assert_eq!(store.product(id).main_image_id, None);
    }

    #[tokio::test]
    async fn corrupt_webcam_capture_creates_no_image() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        let svc = service(store.clone(), MockImageProvider::new(), dir.path(), 3);

        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(b"nao sou png"));
        let err = svc.upload_webcam(Uuid::from_u128(1), &data_url).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidImage(_)));
        assert!(!err.to_string().is_empty());
        assert_eq!(store.total_images(), 0);
    }

    #[tokio::test]
    async fn webcam_file_is_removed_when_attach_fails() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FakeStore::with_products(vec![summary(1, "Alfa", 0)]));
        store.state.lock().unwrap().fail_attach = true;
        let svc = service(store, MockImageProvider::new(), dir.path(), 3);

        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(2, 2)));
        assert!(svc.upload_webcam(Uuid::from_u128(1), &data_url).await.is_err());

        let left = std::fs::read_dir(dir.path().join("images")).map(|d| d.count()).unwrap_or(0);
        assert_eq!(left, 0);
    }

    // ---
    // Formulário e query
    // ---

    #[test]
    fn selection_form_groups_by_product_and_infers_action() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let form = parse_selection_form(&[
            ("selected_images".into(), format!("{},https://x.com/1.jpg?a=1,2", a)),
            ("selected_images".into(), format!("{},https://x.com/2.jpg", b)),
            ("selected_images".into(), format!("{},https://x.com/1.jpg?a=1,2", a)),
            (format!("is_main_{}", b), "https://x.com/2.jpg".into()),
            ("next_product_id".into(), b.to_string()),
            ("csrfmiddlewaretoken".into(), "x".into()),
        ])
        .unwrap();

        assert_eq!(form.action, SelectionAction::SaveAndNext);
        assert_eq!(form.selections.len(), 2);
        assert_eq!(form.selections[0].urls, vec!["https://x.com/1.jpg?a=1,2"]);
        assert_eq!(form.selections[1].main_url.as_deref(), Some("https://x.com/2.jpg"));

        let explicit = parse_selection_form(&[
            ("next_product_id".into(), b.to_string()),
            ("action".into(), "save".into()),
        ])
        .unwrap();
        assert_eq!(explicit.action, SelectionAction::Save);
    }

    #[test]
    fn selection_form_carries_worklist_filters() {
        let form = parse_selection_form(&[
            ("category".into(), "ferramentas".into()),
            ("below".into(), "1".into()),
            ("q".into(), "mart".into()),
        ])
        .unwrap();
        assert_eq!(
            form.scope,
            WorklistScope {
                category: Some("ferramentas".into()),
                below: Some(1),
                q: Some("mart".into()),
            }
        );
        assert_eq!(parse_selection_form(&[]).unwrap().scope, WorklistScope::default());
    }

    #[test]
    fn malformed_selection_entries_are_validation_errors() {
        for pairs in [
            vec![("selected_images".to_string(), "sem-virgula".to_string())],
            vec![("selected_images".to_string(), "nao-uuid,https://x.com/a.jpg".to_string())],
            vec![("next_product_id".to_string(), "123".to_string())],
            vec![("is_main_abc".to_string(), "https://x.com/a.jpg".to_string())],
            vec![("action".to_string(), "apagar".to_string())],
            vec![("below".to_string(), "um".to_string())],
        ] {
            let err = parse_selection_form(&pairs).unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)), "{pairs:?}");
        }
    }

    #[test]
    fn query_template_collapses_missing_parts() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(Arc::new(FakeStore::default()), google(), dir.path(), 3);
        let mut product = summary(1, "Widget-42", 0);
        product.category_name = None;
        assert_eq!(svc.render_query(&product), "Widget-42");

        svc.config.query_template = "{article}   {name}".into();
        assert_eq!(svc.render_query(&product), "ART-1 Widget-42");

        svc.config.query_template = "{category}".into();
        assert_eq!(svc.render_query(&product), "Widget-42");
    }
}
