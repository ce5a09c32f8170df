//! Static lookup tables shared by every dialect scanner.
//!
//! Built once per run and handed to scanners behind an `Arc`; scanners only
//! ever read them.

use biomethod_protocol::Category;
use std::collections::{BTreeMap, HashMap};

/// Shell command (lowercased base name) -> canonical tool
const SHELL_TOOLS: &[(&str, &str)] = &[
    ("bwa", "bwa"),
    ("bwa-mem2", "bwa-mem2"),
    ("bowtie2", "bowtie2"),
    ("bowtie", "bowtie"),
    ("hisat2", "hisat2"),
    ("star", "star"),
    ("salmon", "salmon"),
    ("kallisto", "kallisto"),
    ("rsem", "rsem"),
    ("rsem-calculate-expression", "rsem"),
    ("samtools", "samtools"),
    ("bcftools", "bcftools"),
    ("bedtools", "bedtools"),
    ("gatk", "gatk"),
    ("picard", "picard"),
    ("fastqc", "fastqc"),
    ("multiqc", "multiqc"),
    ("trimmomatic", "trimmomatic"),
    ("fastp", "fastp"),
    ("cutadapt", "cutadapt"),
    ("featurecounts", "featurecounts"),
    ("htseq-count", "htseq"),
    ("stringtie", "stringtie"),
    ("cufflinks", "cufflinks"),
    ("tophat", "tophat"),
    ("minimap2", "minimap2"),
    ("blastn", "blast"),
    ("blastp", "blast"),
    ("blastx", "blast"),
    ("diamond", "diamond"),
    ("hmmer", "hmmer"),
    ("muscle", "muscle"),
    ("mafft", "mafft"),
    ("clustalw", "clustalw"),
    ("vcftools", "vcftools"),
    ("bgzip", "htslib"),
    ("tabix", "htslib"),
    ("freebayes", "freebayes"),
    ("snpeff", "snpeff"),
    ("vep", "vep"),
];

/// Python module path -> canonical tool
const IMPORT_TOOLS: &[(&str, &str)] = &[
    ("pysam", "samtools"),
    ("Bio.Align", "biopython"),
    ("Bio", "biopython"),
    ("biopython", "biopython"),
    ("HTSeq", "htseq"),
    ("pybedtools", "bedtools"),
    ("scanpy", "scanpy"),
    ("anndata", "anndata"),
    ("scipy", "scipy"),
    ("numpy", "numpy"),
    ("pandas", "pandas"),
    ("sklearn", "scikit-learn"),
    ("statsmodels", "statsmodels"),
    ("matplotlib", "matplotlib"),
    ("seaborn", "seaborn"),
    ("plotly", "plotly"),
    ("pydeseq2", "deseq2"),
    ("gseapy", "gsea"),
    ("mygene", "mygene"),
    ("biomart", "biomart"),
    ("pyfaidx", "samtools"),
];

/// Container image / conda package name -> canonical tool
const CONTAINER_TOOLS: &[(&str, &str)] = &[
    ("bwa", "bwa"),
    ("bwa-mem2", "bwa-mem2"),
    ("bowtie2", "bowtie2"),
    ("hisat2", "hisat2"),
    ("star", "star"),
    ("salmon", "salmon"),
    ("kallisto", "kallisto"),
    ("rsem", "rsem"),
    ("samtools", "samtools"),
    ("bcftools", "bcftools"),
    ("bedtools", "bedtools"),
    ("gatk", "gatk"),
    ("gatk4", "gatk"),
    ("picard", "picard"),
    ("fastqc", "fastqc"),
    ("multiqc", "multiqc"),
    ("trimmomatic", "trimmomatic"),
    ("fastp", "fastp"),
    ("cutadapt", "cutadapt"),
    ("featurecounts", "featurecounts"),
    ("subread", "featurecounts"),
    ("htseq", "htseq"),
    ("stringtie", "stringtie"),
    ("minimap2", "minimap2"),
    ("freebayes", "freebayes"),
    ("varscan", "varscan"),
    ("snpeff", "snpeff"),
    ("vep", "vep"),
    ("ensembl-vep", "vep"),
    ("annovar", "annovar"),
];

/// Canonical tool -> default category
const CATEGORIES: &[(&str, Category)] = &[
    ("bwa", Category::Alignment),
    ("bwa-mem2", Category::Alignment),
    ("bowtie", Category::Alignment),
    ("bowtie2", Category::Alignment),
    ("hisat2", Category::Alignment),
    ("star", Category::Alignment),
    ("minimap2", Category::Alignment),
    ("samtools", Category::Alignment),
    ("picard", Category::Alignment),
    ("salmon", Category::Quantification),
    ("kallisto", Category::Quantification),
    ("rsem", Category::Quantification),
    ("featurecounts", Category::Quantification),
    ("htseq", Category::Quantification),
    ("stringtie", Category::Quantification),
    ("bcftools", Category::VariantCalling),
    ("gatk", Category::VariantCalling),
    ("freebayes", Category::VariantCalling),
    ("varscan", Category::VariantCalling),
    ("snpeff", Category::Annotation),
    ("vep", Category::Annotation),
    ("annovar", Category::Annotation),
    ("fastqc", Category::QualityControl),
    ("multiqc", Category::QualityControl),
    ("trimmomatic", Category::Preprocessing),
    ("fastp", Category::Preprocessing),
    ("cutadapt", Category::Preprocessing),
    ("deseq2", Category::DifferentialExpression),
    ("deseq", Category::DifferentialExpression),
    ("edger", Category::DifferentialExpression),
    ("limma", Category::DifferentialExpression),
    ("scanpy", Category::SingleCell),
    ("seurat", Category::SingleCell),
    ("monocle", Category::SingleCell),
    ("monocle3", Category::SingleCell),
    ("scater", Category::SingleCell),
    ("scran", Category::SingleCell),
    ("slingshot", Category::SingleCell),
    ("clusterprofiler", Category::Enrichment),
    ("goseq", Category::Enrichment),
    ("topgo", Category::Enrichment),
    ("biopython", Category::General),
    ("bedtools", Category::Genomics),
    ("genomicranges", Category::Genomics),
    ("biostrings", Category::Genomics),
    ("ggplot2", Category::Visualization),
    ("pheatmap", Category::Visualization),
    ("complexheatmap", Category::Visualization),
    ("enhancedvolcano", Category::Visualization),
];

/// Namespace prefix -> (canonical tool, category) for known-API call mining
const API_PREFIXES: &[(&str, &str, Category)] = &[
    ("pysam.", "samtools", Category::Alignment),
    ("sc.", "scanpy", Category::SingleCell),
    ("scanpy.", "scanpy", Category::SingleCell),
];

/// Lowercased R package -> canonical tool
const R_PACKAGES: &[(&str, &str)] = &[
    ("deseq2", "deseq2"),
    ("deseq", "deseq"),
    ("edger", "edger"),
    ("limma", "limma"),
    ("genomicranges", "genomicranges"),
    ("genomicalignments", "genomicalignments"),
    ("rsamtools", "rsamtools"),
    ("rtracklayer", "rtracklayer"),
    ("biostrings", "biostrings"),
    ("bsgenome", "bsgenome"),
    ("annotationdbi", "annotationdbi"),
    ("org.hs.eg.db", "org.hs.eg.db"),
    ("org.mm.eg.db", "org.mm.eg.db"),
    ("clusterprofile", "clusterprofiler"),
    ("clusterprofiler", "clusterprofiler"),
    ("goseq", "goseq"),
    ("topgo", "topgo"),
    ("mast", "mast"),
    ("singlecellexperiment", "singlecellexperiment"),
    ("scater", "scater"),
    ("scran", "scran"),
    ("seurat", "seurat"),
    ("monocle", "monocle"),
    ("monocle3", "monocle3"),
    ("slingshot", "slingshot"),
    ("complexheatmap", "complexheatmap"),
    ("enhancedvolcano", "enhancedvolcano"),
    ("rsubread", "featurecounts"),
    ("ggplot2", "ggplot2"),
    ("dplyr", "dplyr"),
    ("tidyverse", "tidyverse"),
    ("pheatmap", "pheatmap"),
    ("ggrepel", "ggrepel"),
    ("cowplot", "cowplot"),
    ("patchwork", "patchwork"),
    ("survival", "survival"),
];

/// R function -> (canonical tool, category)
const R_FUNCTIONS: &[(&str, &str, Category)] = &[
    ("DESeqDataSetFromMatrix", "deseq2", Category::DifferentialExpression),
    ("DESeq", "deseq2", Category::DifferentialExpression),
    ("results", "deseq2", Category::DifferentialExpression),
    ("lfcShrink", "deseq2", Category::DifferentialExpression),
    ("DGEList", "edger", Category::DifferentialExpression),
    ("calcNormFactors", "edger", Category::DifferentialExpression),
    ("estimateDisp", "edger", Category::DifferentialExpression),
    ("exactTest", "edger", Category::DifferentialExpression),
    ("glmFit", "edger", Category::DifferentialExpression),
    ("glmLRT", "edger", Category::DifferentialExpression),
    ("voom", "limma", Category::DifferentialExpression),
    ("lmFit", "limma", Category::DifferentialExpression),
    ("eBayes", "limma", Category::DifferentialExpression),
    ("topTable", "limma", Category::DifferentialExpression),
    ("CreateSeuratObject", "seurat", Category::SingleCell),
    ("NormalizeData", "seurat", Category::SingleCell),
    ("FindVariableFeatures", "seurat", Category::SingleCell),
    ("ScaleData", "seurat", Category::SingleCell),
    ("RunPCA", "seurat", Category::SingleCell),
    ("FindNeighbors", "seurat", Category::SingleCell),
    ("FindClusters", "seurat", Category::SingleCell),
    ("RunUMAP", "seurat", Category::SingleCell),
    ("RunTSNE", "seurat", Category::SingleCell),
    ("enrichGO", "clusterprofiler", Category::Enrichment),
    ("enrichKEGG", "clusterprofiler", Category::Enrichment),
    ("gseGO", "clusterprofiler", Category::Enrichment),
    ("gseKEGG", "clusterprofiler", Category::Enrichment),
    ("featureCounts", "featurecounts", Category::Quantification),
];

/// A namespace prefix whose calls always denote one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiPrefix {
    pub prefix: &'static str,
    pub tool: &'static str,
    pub category: Category,
}

/// A known R function and the tool it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RFunction {
    pub name: &'static str,
    pub tool: &'static str,
    pub category: Category,
}

#[derive(Debug, Clone)]
pub struct ToolTables {
    shell_tools: HashMap<&'static str, &'static str>,
    import_tools: HashMap<&'static str, &'static str>,
    import_tools_lower: HashMap<String, &'static str>,
    container_tools: BTreeMap<&'static str, &'static str>,
    categories: HashMap<&'static str, Category>,
    api_prefixes: Vec<ApiPrefix>,
    r_packages: HashMap<&'static str, &'static str>,
    r_functions: Vec<RFunction>,
}

impl Default for ToolTables {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolTables {
    pub fn builtin() -> Self {
        Self {
            shell_tools: SHELL_TOOLS.iter().copied().collect(),
            import_tools: IMPORT_TOOLS.iter().copied().collect(),
            import_tools_lower: IMPORT_TOOLS
                .iter()
                .map(|(module, tool)| (module.to_lowercase(), *tool))
                .collect(),
            container_tools: CONTAINER_TOOLS.iter().copied().collect(),
            categories: CATEGORIES.iter().copied().collect(),
            api_prefixes: API_PREFIXES
                .iter()
                .map(|&(prefix, tool, category)| ApiPrefix {
                    prefix,
                    tool,
                    category,
                })
                .collect(),
            r_packages: R_PACKAGES.iter().copied().collect(),
            r_functions: R_FUNCTIONS
                .iter()
                .map(|&(name, tool, category)| RFunction {
                    name,
                    tool,
                    category,
                })
                .collect(),
        }
    }

    /// Canonical tool for a shell command; `command` may carry a path prefix.
    pub fn shell_tool(&self, command: &str) -> Option<&'static str> {
        let base = command.rsplit('/').next().unwrap_or(command).to_lowercase();
        self.shell_tools.get(base.as_str()).copied()
    }

    /// Canonical tool for an imported module: full path first, then its root.
    pub fn import_tool(&self, module: &str) -> Option<&'static str> {
        if let Some(tool) = self.import_tools.get(module) {
            return Some(tool);
        }
        let root = module.split('.').next().unwrap_or(module);
        self.import_tools.get(root).copied()
    }

    /// Canonical tool for a name seen in free text (version banners).
    pub fn known_tool(&self, name: &str) -> Option<&'static str> {
        let lower = name.to_lowercase();
        self.shell_tools
            .get(lower.as_str())
            .or_else(|| self.import_tools_lower.get(&lower))
            .copied()
    }

    pub fn container_tool(&self, name: &str) -> Option<&'static str> {
        self.container_tools.get(name.to_lowercase().as_str()).copied()
    }

    /// Longest container-table key contained in `haystack` (lowercased).
    pub fn container_tool_within(&self, haystack: &str) -> Option<&'static str> {
        let haystack = haystack.to_lowercase();
        self.container_tools
            .iter()
            .filter(|(key, _)| haystack.contains(*key))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, tool)| *tool)
    }

    pub fn category(&self, tool: &str) -> Category {
        self.categories.get(tool).copied().unwrap_or_default()
    }

    pub fn api_prefix(&self, call_name: &str) -> Option<&ApiPrefix> {
        self.api_prefixes
            .iter()
            .find(|api| call_name.starts_with(api.prefix))
    }

    /// Canonical tool for an R package; unmapped packages keep their lowercased name.
    pub fn r_package(&self, package: &str) -> String {
        let lower = package.to_lowercase();
        self.r_packages
            .get(lower.as_str())
            .map(|tool| (*tool).to_string())
            .unwrap_or(lower)
    }

    pub fn r_function(&self, name: &str) -> Option<&RFunction> {
        self.r_functions.iter().find(|func| func.name == name)
    }

    pub fn r_functions(&self) -> &[RFunction] {
        &self.r_functions
    }
}
