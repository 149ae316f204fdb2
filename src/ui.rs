//! Interface de terminal do relay: spinners e saída colorida.
//!
//! Usa `indicatif` para o spinner de espera e `console` para cores.
//! [`WaitProgress`] acompanha visualmente o loop de `status --wait`.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use relay::{BatchJob, BatchResults, JobStatus};

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Completed => Style::new().green().bold(),
        JobStatus::Failed => Style::new().red().bold(),
        _ => Style::new().yellow(),
    }
}

/// Indicador visual de progresso enquanto um job é consultado em loop.
pub struct WaitProgress {
    pb: ProgressBar,
}

impl WaitProgress {
    /// Inicia o spinner para o job informado.
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed}] {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("waiting for {job_id}"));
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Atualiza a mensagem do spinner com o status mais recente.
    pub fn update(&self, job: &BatchJob) {
        let remote = job.remote_status.as_deref().unwrap_or("-");
        self.pb.set_message(format!(
            "{}: {} (remote: {remote})",
            job.job_id,
            status_style(job.status).apply_to(job.status)
        ));
    }

    /// Imprime um aviso sem interromper o spinner.
    pub fn note(&self, message: &str) {
        self.pb
            .println(format!("  {} {message}", Style::new().yellow().apply_to("↻")));
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Imprime o resumo de um job.
pub fn print_job(job: &BatchJob) {
    let style = status_style(job.status);
    println!("  Job ID:       {}", job.job_id);
    println!("  Provider:     {}", job.provider);
    println!("  Submitted at: {}", job.submitted_at);
    println!("  Status:       {}", style.apply_to(job.status));
    println!("  Requests:     {}", job.n_requests);
    if let Some(provider_ref) = &job.provider_ref {
        println!("  Remote ref:   {provider_ref}");
    }
    if let Some(description) = &job.description {
        println!("  Description:  {description}");
    }
    if let Some(error) = &job.error {
        println!("  Error:        {}", Style::new().red().apply_to(error));
    }
}

/// Imprime uma linha por job na listagem.
pub fn print_job_line(job: &BatchJob) {
    println!(
        "  - {:<32} {:<12} {:>5} requests  {}",
        job.job_id,
        status_style(job.status).apply_to(job.status),
        job.n_requests,
        job.provider
    );
}

/// Imprime o resumo de uma recuperação de resultados em stderr, deixando
/// stdout livre para o JSON.
pub fn print_results_summary(results: &BatchResults) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let failed = results.results.iter().filter(|r| !r.is_success()).count();

    eprintln!(
        "  {} Retrieved {} result(s) for {}",
        green.apply_to("✓"),
        results.len(),
        results.job_id
    );
    if failed > 0 {
        eprintln!("  {} {failed} request(s) returned an error", red.apply_to("✗"));
    }
    if results.is_partial() {
        eprintln!(
            "  {} No result for {} request(s): {}",
            red.apply_to("!"),
            results.missing.len(),
            results.missing.join(", ")
        );
    }
}
